//! Test mask loading and validation
//!
//! The mask holds every threshold and expected value the judge compares against.
//! It is loaded once per run and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::NetworkIdentity;

/// Mask loading errors
#[derive(Error, Debug)]
pub enum MaskError {
    #[error("Failed to read mask file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse mask file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid mask: {0}")]
    Invalid(String),
}

/// Nominal voltage and symmetric tolerance of one power rail
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RailTolerance {
    pub nominal: f64,
    pub tolerance: f64,
}

impl RailTolerance {
    pub fn low(&self) -> f64 {
        self.nominal - self.tolerance
    }

    pub fn high(&self) -> f64 {
        self.nominal + self.tolerance
    }

    /// Inclusive on both ends. Bounds like 3.3 + 0.05 are not exact in binary,
    /// so the comparison allows a rounding slack relative to the nominal.
    pub fn accepts(&self, value: f64) -> bool {
        let slack = RAIL_SLACK * self.nominal.abs().max(1.0);
        self.low() - slack <= value && value <= self.high() + slack
    }
}

const RAIL_SLACK: f64 = 1e-9;

/// LED light-sensor threshold
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedMask {
    pub mask: f64,
}

impl LedMask {
    /// A lit LED darkens the sensor, so the reading must be strictly below the mask
    pub fn accepts(&self, value: f64) -> bool {
        value < self.mask
    }
}

/// Expected Ethernet message and the addresses used for and after the test
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EthernetMask {
    pub message: String,
    #[serde(rename = "testIP")]
    pub test_ip: String,
    #[serde(rename = "testMask")]
    pub test_mask: String,
    #[serde(rename = "testGateway")]
    pub test_gateway: String,
    #[serde(rename = "genericIP")]
    pub generic_ip: String,
    #[serde(rename = "genericMask")]
    pub generic_mask: String,
    #[serde(rename = "genericGateway")]
    pub generic_gateway: String,
}

impl EthernetMask {
    /// Identity the unit uses while the Ethernet test runs
    pub fn test_identity(&self) -> NetworkIdentity {
        NetworkIdentity::new(&self.test_ip, &self.test_mask, &self.test_gateway)
    }

    /// Identity committed to units that fail
    pub fn generic_identity(&self) -> NetworkIdentity {
        NetworkIdentity::new(&self.generic_ip, &self.generic_mask, &self.generic_gateway)
    }
}

/// Calibration data for one run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMask {
    #[serde(rename = "testBoardSN", default)]
    pub test_board_sn: String,
    #[serde(rename = "testBoardPN", default)]
    pub test_board_pn: String,
    pub led: LedMask,
    pub power_supply: BTreeMap<String, RailTolerance>,
    pub ethernet: EthernetMask,
}

impl TestMask {
    /// Load and validate a mask (JSON, or YAML by extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MaskError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| MaskError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mask = Self::parse(&content, is_yaml_file(path)).map_err(|message| {
            MaskError::Parse {
                path: path.to_path_buf(),
                message,
            }
        })?;

        mask.validate()?;
        Ok(mask)
    }

    fn parse(content: &str, yaml: bool) -> Result<Self, String> {
        if yaml {
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        }
    }

    /// Check every entry the judge will rely on
    pub fn validate(&self) -> Result<(), MaskError> {
        if !self.led.mask.is_finite() {
            return Err(MaskError::Invalid("LED mask must be a finite number".into()));
        }

        if self.power_supply.is_empty() {
            return Err(MaskError::Invalid(
                "at least one power supply rail is required".into(),
            ));
        }
        for (rail, tol) in &self.power_supply {
            if !tol.nominal.is_finite() {
                return Err(MaskError::Invalid(format!(
                    "rail '{rail}' nominal must be finite"
                )));
            }
            if !tol.tolerance.is_finite() || tol.tolerance < 0.0 {
                return Err(MaskError::Invalid(format!(
                    "rail '{rail}' tolerance must be a non-negative number"
                )));
            }
        }

        if self.ethernet.message.is_empty() {
            return Err(MaskError::Invalid("ethernet message must not be empty".into()));
        }
        self.ethernet
            .test_identity()
            .validate()
            .map_err(|e| MaskError::Invalid(format!("ethernet test identity: {e}")))?;
        self.ethernet
            .generic_identity()
            .validate()
            .map_err(|e| MaskError::Invalid(format!("ethernet generic identity: {e}")))?;

        Ok(())
    }

    pub fn rail(&self, name: &str) -> Option<&RailTolerance> {
        self.power_supply.get(name)
    }

    /// Example mask with the rails of the reference board
    pub fn example() -> Self {
        let mut power_supply = BTreeMap::new();
        power_supply.insert(
            "3.3".to_string(),
            RailTolerance {
                nominal: 3.3,
                tolerance: 0.1,
            },
        );
        power_supply.insert(
            "5".to_string(),
            RailTolerance {
                nominal: 5.0,
                tolerance: 0.25,
            },
        );

        Self {
            test_board_sn: "TB00001".to_string(),
            test_board_pn: "TESTBOARD:1.0".to_string(),
            led: LedMask { mask: 0.5 },
            power_supply,
            ethernet: EthernetMask {
                message: "Test msg!".to_string(),
                test_ip: "10.0.18.111".to_string(),
                test_mask: "255.255.255.0".to_string(),
                test_gateway: "10.0.18.1".to_string(),
                generic_ip: "192.168.0.200".to_string(),
                generic_mask: "255.255.255.0".to_string(),
                generic_gateway: "192.168.0.1".to_string(),
            },
        }
    }

    /// Serialize to JSON or YAML depending on `path`
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        use anyhow::Context;

        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize mask")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize mask")?
        };
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write mask file: {}", path.display()))
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
