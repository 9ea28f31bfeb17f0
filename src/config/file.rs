//! Configuration file management
//!
//! Handles finding, loading, and validating station configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::StationConfig;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./uc-bringup.yaml",
    "./uc-bringup.yml",
    "./uc-bringup.json",
    "./.uc-bringup/config.yaml",
    "~/.config/uc-bringup/config.yaml",
    "~/.uc-bringup.yaml",
];

/// Full configuration file structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Station settings
    #[serde(default)]
    pub station: StationConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            station: StationConfig::default(),
        }
    }
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load from an explicit path, else the first standard location, else defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::find() {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.version != "1.0" {
            anyhow::bail!("Unsupported config version: {}", self.version);
        }

        let station = &self.station;
        if station.serial.baud_rate == 0 {
            anyhow::bail!("Serial baud rate must be positive");
        }
        if station.serial.read_timeout_ms == 0 {
            anyhow::bail!("Serial read timeout must be positive");
        }
        if station.dialogue.max_lines == 0 || station.dialogue.max_idle_reads == 0 {
            anyhow::bail!("Dialogue budgets must be positive");
        }
        if station.programmer.baud_rate > 230_400 {
            anyhow::bail!(
                "Programmer baud rate {} exceeds 230400",
                station.programmer.baud_rate
            );
        }

        let alloc = &station.allocation;
        if alloc.first_host > alloc.last_host {
            anyhow::bail!(
                "Allocation host range is empty: {}..={}",
                alloc.first_host,
                alloc.last_host
            );
        }
        if !alloc.ip_base.ends_with('.') || alloc.ip_base.split('.').count() != 4 {
            anyhow::bail!(
                "Allocation IP base must be three octets with a trailing dot, got '{}'",
                alloc.ip_base
            );
        }

        Ok(())
    }

    /// Generate example configuration
    pub fn example() -> Self {
        let mut station = StationConfig::default();
        station.serial.port = "/dev/ttyUSB0".to_string();
        station.mask_path = PathBuf::from("mask.json");
        Self {
            version: default_version(),
            station,
        }
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_default() {
        let config = ConfigFile::default();
        assert_eq!(config.version, "1.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = ConfigFile::example();
        config.save(&path).unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.version, config.version);
        assert_eq!(loaded.station.serial.port, config.station.serial.port);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "station": { "serial": { "port": "/dev/ttyS3" } } }"#)
            .unwrap();

        let loaded = ConfigFile::load(&path).unwrap();
        assert_eq!(loaded.station.serial.port, "/dev/ttyS3");
        assert_eq!(loaded.station.serial.baud_rate, 115_200);
        assert_eq!(loaded.station.probe.port, 6791);
    }

    #[test]
    fn test_validate_rejects_programmer_baud() {
        let mut config = ConfigFile::default();
        config.station.programmer.baud_rate = 460_800;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pool() {
        let mut config = ConfigFile::default();
        config.station.allocation.first_host = 220;
        assert!(config.validate().is_err());

        let mut config = ConfigFile::default();
        config.station.allocation.ip_base = "10.0.18".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_explicit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("station.json");
        ConfigFile::example().save(&path).unwrap();
        assert!(ConfigFile::resolve(Some(&path)).is_ok());
        assert!(ConfigFile::resolve(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("./test.yaml");
        assert_eq!(path, PathBuf::from("./test.yaml"));
    }
}
