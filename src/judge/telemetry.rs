//! Telemetry line tags and tokenizers

pub const LED_TAG: &str = "[LED]";
pub const LOOPBACK_TAG: &str = "Loopback";
pub const POWER_TAG: &str = "Power Supply";
pub const RANDOM_TAG: &str = "[RANDOM]";
pub const FERAM_TAG: &str = "[FERAM]";
pub const RECEIVED_TAG: &str = "Received:";

/// Numeric tokens in the shape `\d*\.?\d+`, leftmost first
pub fn numeric_tokens(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let int_end = digits_from(i);
        let has_fraction =
            int_end + 1 < bytes.len() && bytes[int_end] == b'.' && bytes[int_end + 1].is_ascii_digit();

        let end = if has_fraction {
            digits_from(int_end + 1)
        } else if int_end > i {
            int_end
        } else {
            i += 1;
            continue;
        };

        tokens.push(&line[i..end]);
        i = end;
    }
    tokens
}

/// First numeric token parsed as a float
pub fn first_number(text: &str) -> Option<f64> {
    numeric_tokens(text).first().and_then(|t| t.parse().ok())
}

/// Contents of every non-empty `[...]` group
pub fn bracketed(line: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(0) => rest = &after[1..],
            Some(close) => {
                groups.push(&after[..close]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    groups
}

/// Every two-hex-digit token, left to right, non-overlapping
pub fn hex_byte_tokens(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i].is_ascii_hexdigit() && bytes[i + 1].is_ascii_hexdigit() {
            tokens.push(&text[i..i + 2]);
            i += 2;
        } else {
            i += 1;
        }
    }
    tokens
}

/// The first literal `Pass` or `Fail` in the line
pub fn verdict_token(line: &str) -> Option<&'static str> {
    match (line.find("Pass"), line.find("Fail")) {
        (Some(p), Some(f)) if f < p => Some("Fail"),
        (Some(_), _) => Some("Pass"),
        (None, Some(_)) => Some("Fail"),
        (None, None) => None,
    }
}

/// Text between the first pair of double quotes
pub fn quoted(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

/// Text following the first occurrence of `tag`
pub fn after_tag<'a>(line: &'a str, tag: &str) -> &'a str {
    line.find(tag).map(|i| &line[i + tag.len()..]).unwrap_or("")
}

/// Whitespace-separated words stripped of surrounding punctuation, with the byte
/// offset just past each word
pub fn words(line: &str) -> Vec<(&str, usize)> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for raw in line.split_whitespace() {
        let Some(pos) = line[cursor..].find(raw) else {
            break;
        };
        let end = cursor + pos + raw.len();
        cursor = end;

        let word = raw.trim_matches(|c: char| !(c.is_alphanumeric() || c == '.' || c == '_'));
        let word = word.trim_end_matches('.');
        if !word.is_empty() {
            out.push((word, end));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_tokens() {
        assert_eq!(numeric_tokens("[LED] 1 0.30"), vec!["1", "0.30"]);
        assert_eq!(numeric_tokens("Power Supply 3.3V: 3.29"), vec!["3.3", "3.29"]);
        assert_eq!(numeric_tokens("value .5 and 12."), vec![".5", "12"]);
        assert_eq!(numeric_tokens("1.2.3"), vec!["1.2", ".3"]);
        assert_eq!(numeric_tokens("-0.25"), vec!["0.25"]);
        assert!(numeric_tokens("no digits here").is_empty());
    }

    #[test]
    fn test_bracketed() {
        assert_eq!(
            bracketed("Loopback [P0.1] <-> [P1.7]: Pass"),
            vec!["P0.1", "P1.7"]
        );
        assert_eq!(bracketed("[] [A] [unterminated"), vec!["A"]);
    }

    #[test]
    fn test_hex_byte_tokens() {
        assert_eq!(hex_byte_tokens(" DE AD be ef"), vec!["DE", "AD", "be", "ef"]);
        assert_eq!(hex_byte_tokens("0a1b2"), vec!["0a", "1b"]);
        assert_eq!(hex_byte_tokens(" zz x1"), Vec::<&str>::new());
    }

    #[test]
    fn test_verdict_token() {
        assert_eq!(verdict_token("[FERAM] Fail (Pass expected)"), Some("Fail"));
        assert_eq!(verdict_token("Loopback [a] [b]: Pass"), Some("Pass"));
        assert_eq!(verdict_token("Loopback [a] [b]: ok"), None);
    }

    #[test]
    fn test_quoted() {
        assert_eq!(quoted(r#"Received: "Test msg!" (10 bytes)"#), Some("Test msg!"));
        assert_eq!(quoted(r#"Received: """#), Some(""));
        assert_eq!(quoted("Received: nothing"), None);
        assert_eq!(quoted(r#"Received: "open"#), None);
    }

    #[test]
    fn test_words_with_offsets() {
        let line = "Power Supply PS3V3: 3.29 V";
        let words = words(line);
        let (word, end) = words[2];
        assert_eq!(word, "PS3V3");
        assert_eq!(&line[end..], " 3.29 V");
        assert_eq!(words[3].0, "3.29");
    }

    #[test]
    fn test_after_tag() {
        assert_eq!(after_tag("x [RANDOM] AB", RANDOM_TAG), " AB");
        assert_eq!(after_tag("no tag", RANDOM_TAG), "");
    }
}
