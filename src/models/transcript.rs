//! Serial transcript model

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lines captured from the unit during one dialogue pass, in arrival order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a line; the transcript only ever grows
    pub(crate) fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    #[cfg(test)]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines containing `tag`, in transcript order
    pub fn tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(move |line| line.contains(tag))
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }

    /// Load a transcript saved as plain text, one line per line
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
        Ok(Self::from_lines(content.lines()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_tagged_preserves_order() {
        let t = Transcript::from_lines(["[LED] 1 0.3", "noise", "[LED] 2 0.4"]);
        let led: Vec<_> = t.tagged("[LED]").collect();
        assert_eq!(led, vec!["[LED] 1 0.3", "[LED] 2 0.4"]);
    }

    #[test]
    fn test_load_plain_text_capture() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pass1.log");
        std::fs::write(&path, "Insert MAC:\n[LED] 1 0.30\nEnd of tests!\n").unwrap();

        let loaded = Transcript::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.lines()[1], "[LED] 1 0.30");
        assert!(loaded.contains("End of tests!"));
        assert!(!loaded.is_empty());
    }

    #[test]
    fn test_missing_capture_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Transcript::load(dir.path().join("absent.log")).is_err());
    }
}
