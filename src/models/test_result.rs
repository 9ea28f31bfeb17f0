//! Test result models for board bring-up
//!
//! Defines subsystems, measurements, per-subsystem results and the final report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::identity::{BoardInfo, NetworkIdentity};

/// The five peripheral domains exercised on the unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Subsystem {
    Led,
    Gpio,
    PowerSupply,
    Feram,
    Ethernet,
}

impl Subsystem {
    /// Get subsystem display name
    pub fn name(&self) -> &'static str {
        match self {
            Subsystem::Led => "LED",
            Subsystem::Gpio => "GPIO Loopback",
            Subsystem::PowerSupply => "Power Supply",
            Subsystem::Feram => "FeRAM",
            Subsystem::Ethernet => "Ethernet",
        }
    }

    /// Key used in exported results
    pub fn key(&self) -> &'static str {
        match self {
            Subsystem::Led => "led",
            Subsystem::Gpio => "gpio",
            Subsystem::PowerSupply => "powerSupply",
            Subsystem::Feram => "feram",
            Subsystem::Ethernet => "ethernet",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Raw value observed on the unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observed {
    Numeric(f64),
    Categorical(String),
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Numeric(v) => write!(f, "{v:.3}"),
            Observed::Categorical(s) => write!(f, "{s}"),
        }
    }
}

/// One observed value and the verdict derived from it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub key: String,
    pub value: Observed,
    pub passed: bool,
    /// Limits or labels that explain the verdict (pins, bounds, threshold)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Measurement {
    pub fn numeric(key: impl Into<String>, value: f64, passed: bool) -> Self {
        Self {
            key: key.into(),
            value: Observed::Numeric(value),
            passed,
            attributes: BTreeMap::new(),
        }
    }

    pub fn categorical(key: impl Into<String>, value: impl Into<String>, passed: bool) -> Self {
        Self {
            key: key.into(),
            value: Observed::Categorical(value.into()),
            passed,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.insert(name.into(), value.to_string());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Aggregate state of a subsystem
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubsystemStatus {
    Pass,
    Fail,
    /// No telemetry reached the parser; fails closed
    NoSignal,
}

impl SubsystemStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            SubsystemStatus::Pass => "✓",
            SubsystemStatus::Fail => "✗",
            SubsystemStatus::NoSignal => "?",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubsystemStatus::Pass)
    }
}

impl fmt::Display for SubsystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsystemStatus::Pass => write!(f, "PASS"),
            SubsystemStatus::Fail => write!(f, "FAIL"),
            SubsystemStatus::NoSignal => write!(f, "NO SIGNAL"),
        }
    }
}

/// Ordered measurements of one subsystem plus their aggregate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubsystemResult {
    pub subsystem: Subsystem,
    pub status: SubsystemStatus,
    pub measurements: Vec<Measurement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl SubsystemResult {
    /// Build a result; an empty measurement list is `NoSignal`, never a pass
    pub fn new(
        subsystem: Subsystem,
        measurements: Vec<Measurement>,
        diagnostics: Vec<String>,
    ) -> Self {
        let status = if measurements.is_empty() {
            SubsystemStatus::NoSignal
        } else if measurements.iter().all(|m| m.passed) {
            SubsystemStatus::Pass
        } else {
            SubsystemStatus::Fail
        };

        Self {
            subsystem,
            status,
            measurements,
            diagnostics,
        }
    }

    pub fn passed(&self) -> bool {
        self.status.is_success()
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.key == key)
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.measurements
            .iter()
            .filter(|m| !m.passed)
            .map(|m| m.key.as_str())
            .collect()
    }
}

impl fmt::Display for SubsystemResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} measurements)",
            self.status.symbol(),
            self.subsystem,
            self.measurements.len()
        )?;
        if let Some(first) = self.diagnostics.first() {
            write!(f, " - {first}")?;
        }
        Ok(())
    }
}

/// Nonvolatile memory check: device-reported verdict plus the random pattern it used
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeramResult {
    pub pattern: String,
    #[serde(flatten)]
    pub result: SubsystemResult,
}

impl FeramResult {
    /// Pattern split into display rows of `width` characters
    pub fn pattern_rows(&self, width: usize) -> Vec<&str> {
        let mut rows = Vec::new();
        let mut rest = self.pattern.as_str();
        while !rest.is_empty() {
            let cut = rest.len().min(width.max(1));
            let (row, tail) = rest.split_at(cut);
            rows.push(row);
            rest = tail;
        }
        rows
    }
}

/// Ethernet check: received message plus the addresses exercised
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthernetResult {
    pub message: String,
    pub mac: String,
    pub target: NetworkIdentity,
    pub test: NetworkIdentity,
    #[serde(flatten)]
    pub result: SubsystemResult,
}

impl EthernetResult {
    /// Received message as lowercase hex
    pub fn message_hex(&self) -> String {
        self.message.bytes().map(|b| format!("{b:02x}")).collect()
    }
}

/// Full judgement of one unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub board: BoardInfo,
    pub led: SubsystemResult,
    pub gpio: SubsystemResult,
    pub power_supply: SubsystemResult,
    pub feram: FeramResult,
    pub ethernet: EthernetResult,
    pub passed: bool,
    pub judged_at: DateTime<Utc>,
}

impl TestReport {
    /// Assemble the report; the overall verdict is the AND of all five subsystems
    pub fn new(
        board: BoardInfo,
        led: SubsystemResult,
        gpio: SubsystemResult,
        power_supply: SubsystemResult,
        feram: FeramResult,
        ethernet: EthernetResult,
    ) -> Self {
        let passed = led.passed()
            && gpio.passed()
            && power_supply.passed()
            && feram.result.passed()
            && ethernet.result.passed();

        Self {
            board,
            led,
            gpio,
            power_supply,
            feram,
            ethernet,
            passed,
            judged_at: Utc::now(),
        }
    }

    /// Subsystem results in report order
    pub fn subsystems(&self) -> Vec<&SubsystemResult> {
        vec![
            &self.led,
            &self.gpio,
            &self.power_supply,
            &self.feram.result,
            &self.ethernet.result,
        ]
    }

    pub fn failed_subsystems(&self) -> Vec<Subsystem> {
        self.subsystems()
            .into_iter()
            .filter(|r| !r.passed())
            .map(|r| r.subsystem)
            .collect()
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Board {} - {}", self.board.board_sn, self.board.board_pn)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in self.subsystems() {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "Result: {}", if self.passed { "PASS" } else { "FAIL" })
    }
}
