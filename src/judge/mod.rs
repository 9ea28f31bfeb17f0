//! Transcript parser and judge
//!
//! Turns a captured transcript into per-subsystem results against a test mask.
//! Pure: no I/O, every verdict is derived from a reading and its mask entry.
//! The Ethernet probe outcome is judged against the mask's `testIP`, which it
//! records as its attribute.

mod telemetry;


use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::{RailTolerance, TestMask};
use crate::models::{
    BoardInfo, EthernetResult, FeramResult, MacAddress, Measurement, NetworkIdentity, Subsystem,
    SubsystemResult, TestReport, Transcript,
};
use crate::net::ProbeStatus;
use telemetry::{
    after_tag, bracketed, first_number, hex_byte_tokens, numeric_tokens, quoted, verdict_token,
    words, FERAM_TAG, LED_TAG, LOOPBACK_TAG, POWER_TAG, RANDOM_TAG, RECEIVED_TAG,
};

/// Judges transcripts against one mask
pub struct Judge<'m> {
    mask: &'m TestMask,
}

impl<'m> Judge<'m> {
    pub fn new(mask: &'m TestMask) -> Self {
        Self { mask }
    }

    /// Build the full report for one unit
    pub fn evaluate(
        &self,
        transcript: &Transcript,
        board: BoardInfo,
        mac: &MacAddress,
        target: &NetworkIdentity,
        probe: &ProbeStatus,
    ) -> TestReport {
        let report = TestReport::new(
            board,
            self.led(transcript),
            self.gpio(transcript),
            self.power_supply(transcript),
            self.feram(transcript),
            self.ethernet(transcript, mac, target, probe),
        );

        info!(
            "Judged {}: {}",
            report.board.board_sn,
            if report.passed { "PASS" } else { "FAIL" }
        );
        for result in report.subsystems() {
            debug!("  {}", result);
        }
        report
    }

    /// LED sensors: lit when the reading is strictly below the threshold
    pub fn led(&self, transcript: &Transcript) -> SubsystemResult {
        let mut keys = KeySequence::default();
        let mut measurements = Vec::new();
        let mut diagnostics = Vec::new();

        for line in transcript.tagged(LED_TAG) {
            let tokens = numeric_tokens(line);
            let value = tokens.get(1).and_then(|t| t.parse::<f64>().ok());
            match (tokens.first(), value) {
                (Some(id), Some(value)) => {
                    let passed = self.mask.led.accepts(value);
                    measurements.push(
                        Measurement::numeric(keys.next(id), value, passed)
                            .with_attribute("threshold", self.mask.led.mask),
                    );
                }
                _ => diagnostics.push(format!("unreadable LED line: {line}")),
            }
        }

        if measurements.is_empty() {
            diagnostics.push(missing(LED_TAG));
        }
        SubsystemResult::new(Subsystem::Led, measurements, diagnostics)
    }

    /// GPIO loopback pairs in transcript order, verdict reported by the unit
    pub fn gpio(&self, transcript: &Transcript) -> SubsystemResult {
        let mut measurements = Vec::new();
        let mut diagnostics = Vec::new();

        for line in transcript.tagged(LOOPBACK_TAG) {
            let pins = bracketed(line);
            match (pins.as_slice(), verdict_token(line)) {
                ([pin1, pin2, ..], Some(verdict)) => {
                    let index = measurements.len().to_string();
                    measurements.push(
                        Measurement::categorical(index, verdict, verdict == "Pass")
                            .with_attribute("pin1", pin1)
                            .with_attribute("pin2", pin2),
                    );
                }
                _ => diagnostics.push(format!("unreadable loopback line: {line}")),
            }
        }

        if measurements.is_empty() {
            diagnostics.push(missing(LOOPBACK_TAG));
        }
        SubsystemResult::new(Subsystem::Gpio, measurements, diagnostics)
    }

    /// Power rails within nominal ± tolerance, both ends inclusive
    pub fn power_supply(&self, transcript: &Transcript) -> SubsystemResult {
        let mut keys = KeySequence::default();
        let mut measurements = Vec::new();
        let mut diagnostics = Vec::new();

        for line in transcript.tagged(POWER_TAG) {
            let Some((rail, value)) = self.locate_rail(line) else {
                diagnostics.push(format!("unreadable power line: {line}"));
                continue;
            };

            let key = keys.next(&rail);
            let measurement = match self.lookup_rail(&rail) {
                Some(tolerance) => Measurement::numeric(key, value, tolerance.accepts(value))
                    .with_attribute("nominal", tolerance.nominal)
                    .with_attribute("tolerance", tolerance.tolerance),
                None => {
                    diagnostics.push(format!("rail {rail}: no mask entry"));
                    Measurement::numeric(key, value, false).with_attribute("mask", "none")
                }
            };
            measurements.push(measurement);
        }

        if measurements.is_empty() {
            diagnostics.push(missing(POWER_TAG));
        }
        SubsystemResult::new(Subsystem::PowerSupply, measurements, diagnostics)
    }

    /// Memory check: the unit's own verdict plus the random pattern it wrote
    pub fn feram(&self, transcript: &Transcript) -> FeramResult {
        let pattern: String = transcript
            .tagged(RANDOM_TAG)
            .flat_map(|line| hex_byte_tokens(after_tag(line, RANDOM_TAG)))
            .collect();

        let mut diagnostics = Vec::new();
        let mut measurements = Vec::new();

        match transcript.tagged(FERAM_TAG).find_map(verdict_token) {
            Some(verdict) => {
                measurements.push(Measurement::categorical("verdict", verdict, verdict == "Pass"))
            }
            None => diagnostics.push(missing(FERAM_TAG)),
        }
        if pattern.is_empty() {
            diagnostics.push(missing(RANDOM_TAG));
        }

        FeramResult {
            pattern,
            result: SubsystemResult::new(Subsystem::Feram, measurements, diagnostics),
        }
    }

    /// Ethernet: the echoed probe message must match the mask byte for byte
    pub fn ethernet(
        &self,
        transcript: &Transcript,
        mac: &MacAddress,
        target: &NetworkIdentity,
        probe: &ProbeStatus,
    ) -> EthernetResult {
        let expected = &self.mask.ethernet.message;
        let received = transcript.tagged(RECEIVED_TAG).filter_map(quoted).last();

        let mut measurements = Vec::new();
        let mut diagnostics = Vec::new();

        let test_ip = &self.mask.ethernet.test_ip;
        match probe {
            ProbeStatus::NotAttempted => {}
            ProbeStatus::Delivered => measurements.push(
                Measurement::categorical("probe", "delivered", true)
                    .with_attribute("testIP", test_ip),
            ),
            ProbeStatus::Failed(reason) => {
                diagnostics.push(format!("probe failed: {reason}"));
                measurements.push(
                    Measurement::categorical("probe", "failed", false)
                        .with_attribute("testIP", test_ip),
                );
            }
        }

        match received {
            Some(message) => measurements.push(Measurement::categorical(
                "message",
                message,
                message == expected.as_str(),
            )),
            None => {
                diagnostics.push(missing(RECEIVED_TAG));
                // A probe reading alone must not carry the subsystem
                if !measurements.is_empty() {
                    measurements.push(Measurement::categorical("message", "", false));
                }
            }
        }

        EthernetResult {
            message: received.unwrap_or_default().to_string(),
            mac: mac.colon_delimited(),
            target: target.clone(),
            test: self.mask.ethernet.test_identity(),
            result: SubsystemResult::new(Subsystem::Ethernet, measurements, diagnostics),
        }
    }

    /// Rail name and reading from a power line.
    ///
    /// A word naming a configured rail wins and takes the first number after it;
    /// otherwise the first two numbers are rail and reading.
    fn locate_rail(&self, line: &str) -> Option<(String, f64)> {
        for (word, end) in words(line) {
            if self.mask.power_supply.contains_key(word) {
                if let Some(value) = first_number(&line[end..]) {
                    return Some((word.to_string(), value));
                }
            }
        }

        let tokens = numeric_tokens(line);
        match tokens.as_slice() {
            [rail, value, ..] => Some((rail.to_string(), value.parse().ok()?)),
            _ => None,
        }
    }

    /// Exact key first, then numeric equality ("5" reads the "5.0" entry)
    fn lookup_rail(&self, rail: &str) -> Option<&RailTolerance> {
        if let Some(tolerance) = self.mask.rail(rail) {
            return Some(tolerance);
        }
        let wanted: f64 = rail.parse().ok()?;
        self.mask
            .power_supply
            .iter()
            .find(|(key, _)| key.parse::<f64>().ok() == Some(wanted))
            .map(|(_, tolerance)| tolerance)
    }
}

fn missing(tag: &str) -> String {
    format!("no '{tag}' telemetry in transcript")
}

/// Hands out unique keys, suffixing repeats with ` #n`
#[derive(Default)]
struct KeySequence {
    seen: HashMap<String, usize>,
}

impl KeySequence {
    fn next(&mut self, key: &str) -> String {
        let count = self.seen.entry(key.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            key.to_string()
        } else {
            format!("{key} #{count}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubsystemStatus;
    use std::collections::BTreeMap;

    fn mask() -> TestMask {
        let mut mask = TestMask::example();
        let mut rails = BTreeMap::new();
        rails.insert(
            "PS3V3".to_string(),
            RailTolerance {
                nominal: 3.3,
                tolerance: 0.1,
            },
        );
        rails.insert(
            "5".to_string(),
            RailTolerance {
                nominal: 5.0,
                tolerance: 0.25,
            },
        );
        mask.power_supply = rails;
        mask
    }

    fn transcript(lines: &[&str]) -> Transcript {
        Transcript::from_lines(lines.iter().copied())
    }

    const PASSING: &[&str] = &[
        "Insert MAC:",
        "[LED] 1 0.30",
        "Loopback [P0.1] [P0.2]: Pass",
        "[RANDOM] DE AD BE EF",
        "Power Supply PS3V3 value 3.29",
        "Loopback [P0.3] [P0.4]: Pass",
        "[RANDOM] 01 23",
        "[FERAM] Pass",
        "Listening on port: 6791",
        "Received: \"Test msg!\"",
        "End of tests!",
    ];

    fn judge_all(mask: &TestMask, lines: &[&str]) -> TestReport {
        let mac: MacAddress = "020000000001".parse().unwrap();
        let target = NetworkIdentity::new("10.0.18.201", "255.255.255.0", "10.0.18.1");
        Judge::new(mask).evaluate(
            &transcript(lines),
            BoardInfo::new("tester", "CN00001"),
            &mac,
            &target,
            &ProbeStatus::Delivered,
        )
    }

    #[test]
    fn test_all_subsystems_pass() {
        let report = judge_all(&mask(), PASSING);

        for result in report.subsystems() {
            assert_eq!(result.status, SubsystemStatus::Pass, "{result}");
        }
        assert!(report.passed);
        assert_eq!(report.ethernet.mac, "02:00:00:00:00:01");
        assert_eq!(report.ethernet.target.ip, "10.0.18.201");
        assert_eq!(report.ethernet.test.ip, "10.0.18.111");
    }

    #[test]
    fn test_ethernet_message_mismatch_is_independent() {
        let lines: Vec<&str> = PASSING
            .iter()
            .map(|l| {
                if l.starts_with("Received:") {
                    "Received: \"Test msg?\""
                } else {
                    l
                }
            })
            .collect();
        let report = judge_all(&mask(), &lines);

        assert_eq!(report.ethernet.result.status, SubsystemStatus::Fail);
        assert!(!report.passed);
        assert_eq!(report.failed_subsystems(), vec![Subsystem::Ethernet]);
    }

    #[test]
    fn test_exactly_one_failing_subsystem_fails_overall() {
        let swaps: &[(&str, &str)] = &[
            ("[LED] 1 0.30", "[LED] 1 0.90"),
            ("Loopback [P0.3] [P0.4]: Pass", "Loopback [P0.3] [P0.4]: Fail"),
            ("Power Supply PS3V3 value 3.29", "Power Supply PS3V3 value 3.55"),
            ("[FERAM] Pass", "[FERAM] Fail"),
            ("Received: \"Test msg!\"", "Received: \"test msg!\""),
        ];
        let expected = [
            Subsystem::Led,
            Subsystem::Gpio,
            Subsystem::PowerSupply,
            Subsystem::Feram,
            Subsystem::Ethernet,
        ];

        for ((from, to), subsystem) in swaps.iter().zip(expected) {
            let lines: Vec<&str> = PASSING
                .iter()
                .map(|l| if l == from { *to } else { *l })
                .collect();
            let report = judge_all(&mask(), &lines);
            assert!(!report.passed);
            assert_eq!(report.failed_subsystems(), vec![subsystem]);
        }
    }

    #[test]
    fn test_power_boundaries_inclusive() {
        let mut mask = mask();
        mask.power_supply.insert(
            "12".to_string(),
            RailTolerance {
                nominal: 12.0,
                tolerance: 0.5,
            },
        );
        let judge = Judge::new(&mask);
        let verdict = |value: &str| {
            let line = format!("Power Supply 12 {value}");
            judge.power_supply(&transcript(&[line.as_str()])).measurements[0].passed
        };

        assert!(verdict("11.5"));
        assert!(verdict("12.5"));
        assert!(!verdict("11.49"));
        assert!(!verdict("12.51"));
    }

    #[test]
    fn test_power_boundaries_inclusive_for_decimal_masks() {
        let mut mask = mask();
        mask.power_supply.insert(
            "PS3V3".to_string(),
            RailTolerance {
                nominal: 3.3,
                tolerance: 0.05,
            },
        );
        mask.power_supply.insert(
            "PS1V8".to_string(),
            RailTolerance {
                nominal: 1.8,
                tolerance: 0.15,
            },
        );
        let judge = Judge::new(&mask);
        let verdict = |line: &str| judge.power_supply(&transcript(&[line])).measurements[0].passed;

        assert!(verdict("Power Supply PS3V3 value 3.35"));
        assert!(verdict("Power Supply PS3V3 value 3.25"));
        assert!(verdict("Power Supply PS1V8 value 1.65"));
        assert!(verdict("Power Supply PS1V8 value 1.95"));
        assert!(!verdict("Power Supply PS3V3 value 3.3501"));
        assert!(!verdict("Power Supply PS1V8 value 1.6499"));
    }

    #[test]
    fn test_led_threshold_is_strict() {
        let mask = mask();
        let judge = Judge::new(&mask);

        let at = judge.led(&transcript(&["[LED] 1 0.5"]));
        assert_eq!(at.status, SubsystemStatus::Fail);

        let below = judge.led(&transcript(&["[LED] 1 0.49"]));
        assert_eq!(below.status, SubsystemStatus::Pass);
        assert_eq!(below.measurements[0].value.to_string(), "0.490");
    }

    #[test]
    fn test_missing_telemetry_is_no_signal() {
        let mask = mask();
        let report = judge_all(&mask, &["Insert MAC:", "End of tests!"]);

        assert!(!report.passed);
        assert_eq!(report.led.status, SubsystemStatus::NoSignal);
        assert_eq!(report.gpio.status, SubsystemStatus::NoSignal);
        assert_eq!(report.power_supply.status, SubsystemStatus::NoSignal);
        assert_eq!(report.feram.result.status, SubsystemStatus::NoSignal);
        assert!(report.led.diagnostics[0].contains("[LED]"));
    }

    #[test]
    fn test_ethernet_without_received_line_is_empty_and_failing() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let mac: MacAddress = "020000000001".parse().unwrap();
        let target = mask.ethernet.generic_identity();

        let result = judge.ethernet(
            &transcript(&["Listening on port: 6791"]),
            &mac,
            &target,
            &ProbeStatus::NotAttempted,
        );

        assert_eq!(result.message, "");
        assert_eq!(result.result.status, SubsystemStatus::NoSignal);
        assert!(!result.result.passed());
    }

    #[test]
    fn test_probe_failure_fails_ethernet() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let mac: MacAddress = "020000000001".parse().unwrap();

        let result = judge.ethernet(
            &transcript(&[]),
            &mac,
            &mask.ethernet.test_identity(),
            &ProbeStatus::Failed("Connection refused".into()),
        );

        assert_eq!(result.result.status, SubsystemStatus::Fail);
        assert!(result.result.diagnostics.iter().any(|d| d.contains("refused")));
        assert_eq!(
            result.result.measurements[0].attribute("testIP"),
            Some(mask.ethernet.test_ip.as_str())
        );
    }

    #[test]
    fn test_delivered_probe_records_test_address() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let mac: MacAddress = "020000000001".parse().unwrap();

        let result = judge.ethernet(
            &transcript(&["Received: \"Test msg!\""]),
            &mac,
            &mask.ethernet.test_identity(),
            &ProbeStatus::Delivered,
        );

        let probe = result.result.get("probe").unwrap();
        assert!(probe.passed);
        assert_eq!(probe.attribute("testIP"), Some(mask.ethernet.test_ip.as_str()));
        assert_eq!(result.result.status, SubsystemStatus::Pass);
    }

    #[test]
    fn test_last_received_line_wins() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let mac: MacAddress = "020000000001".parse().unwrap();

        let result = judge.ethernet(
            &transcript(&["Received: \"garbage\"", "Received: \"Test msg!\""]),
            &mac,
            &mask.ethernet.test_identity(),
            &ProbeStatus::NotAttempted,
        );
        assert_eq!(result.message, "Test msg!");
        assert_eq!(result.message_hex(), "54657374206d736721");
        assert!(result.result.passed());
    }

    #[test]
    fn test_gpio_order_follows_transcript() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let result = judge.gpio(&transcript(&[
            "Loopback [A1] [A2]: Pass",
            "[LED] 1 0.30",
            "Loopback [B1] [B2]: Fail",
            "Power Supply 5 5.01",
            "Loopback [C1] [C2]: Pass",
        ]));

        let pins: Vec<(&str, Option<&str>)> = result
            .measurements
            .iter()
            .map(|m| (m.key.as_str(), m.attribute("pin1")))
            .collect();
        assert_eq!(
            pins,
            vec![("0", Some("A1")), ("1", Some("B1")), ("2", Some("C1"))]
        );
        assert_eq!(result.failed_keys(), vec!["1"]);
    }

    #[test]
    fn test_feram_pattern_concatenates_tokens() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let lines = ["[RANDOM] 3F a0 7c", "noise 99", "[RANDOM] 00 FF", "[FERAM] Pass"];
        let result = judge.feram(&transcript(&lines));

        assert_eq!(result.pattern, "3Fa07c00FF");
        let chunks: Vec<&str> = result
            .pattern
            .as_bytes()
            .chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect();
        assert_eq!(chunks, vec!["3F", "a0", "7c", "00", "FF"]);
        assert!(result.result.passed());
    }

    #[test]
    fn test_feram_uses_device_verdict() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let result = judge.feram(&transcript(&["[RANDOM] 00", "[FERAM] Fail", "[FERAM] Pass"]));
        assert_eq!(result.result.status, SubsystemStatus::Fail);
    }

    #[test]
    fn test_power_numeric_fallback_and_unknown_rail() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let result = judge.power_supply(&transcript(&[
            "Power Supply 5.0V: 4.9",
            "Power Supply 24 23.8",
        ]));

        let five = result.get("5.0").unwrap();
        assert!(five.passed);
        assert_eq!(five.attribute("nominal"), Some("5"));

        let unknown = result.get("24").unwrap();
        assert!(!unknown.passed);
        assert!(result.diagnostics.iter().any(|d| d.contains("no mask entry")));
        assert_eq!(result.status, SubsystemStatus::Fail);
    }

    #[test]
    fn test_duplicate_keys_are_kept() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let result = judge.led(&transcript(&["[LED] 1 0.1", "[LED] 1 0.2", "[LED] 1 0.3"]));

        let keys: Vec<&str> = result.measurements.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["1", "1 #2", "1 #3"]);
    }

    #[test]
    fn test_malformed_lines_become_diagnostics() {
        let mask = mask();
        let judge = Judge::new(&mask);
        let result = judge.led(&transcript(&["[LED] broken", "[LED] 2 0.1"]));

        assert_eq!(result.measurements.len(), 1);
        assert_eq!(result.status, SubsystemStatus::Pass);
        assert!(result.diagnostics[0].contains("unreadable"));
    }
}
