//! Configuration module
//!
//! Handles loading and managing station configuration and test masks.

mod env;
mod file;
mod mask;

pub use env::{print_env_help, EnvConfig};
pub use file::ConfigFile;
pub use mask::{MaskError, RailTolerance, TestMask};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Station configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Path to the test mask
    pub mask_path: PathBuf,

    /// Directory for rendered certificates
    pub reports_dir: PathBuf,

    /// Directory for stored run records
    pub results_dir: PathBuf,

    /// Serial link to the unit
    pub serial: SerialConfig,

    /// Dialogue budgets
    pub dialogue: DialogueConfig,

    /// Ethernet probe settings
    pub probe: ProbeConfig,

    /// ISP programmer settings
    pub programmer: ProgrammerConfig,

    /// Firmware images
    pub firmware: FirmwareConfig,

    /// Serial number / address allocation
    pub allocation: AllocationConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            mask_path: PathBuf::from("mask.json"),
            reports_dir: PathBuf::from("reports"),
            results_dir: PathBuf::from("results"),
            serial: SerialConfig::default(),
            dialogue: DialogueConfig::default(),
            probe: ProbeConfig::default(),
            programmer: ProgrammerConfig::default(),
            firmware: FirmwareConfig::default(),
            allocation: AllocationConfig::default(),
        }
    }
}

impl StationConfig {
    /// Apply environment overrides on top of file values
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(port) = &env.port {
            self.serial.port = port.clone();
        }
        if let Some(mask) = &env.mask {
            self.mask_path = PathBuf::from(mask);
        }
        if let Some(reports) = &env.reports {
            self.reports_dir = PathBuf::from(reports);
        }
        if let Some(results) = &env.results {
            self.results_dir = PathBuf::from(results);
        }
    }
}

/// Serial link settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path of the unit's UART
    pub port: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// Hold time of each reset pulse phase in milliseconds
    pub reset_hold_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 3000,
            reset_hold_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reset_hold(&self) -> Duration {
        Duration::from_millis(self.reset_hold_ms)
    }
}

/// Limits that keep a dialogue pass from hanging on a silent unit
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Maximum lines accepted in one pass
    pub max_lines: usize,

    /// Consecutive read timeouts before the pass is abandoned
    pub max_idle_reads: u32,

    /// Wall-clock budget of one pass in seconds
    pub pass_timeout_secs: u64,

    /// Lines allowed between ETH stack init and the listening announcement
    pub listen_window_lines: usize,

    /// Bytes of boot banner discarded after the start command
    pub banner_bytes: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_lines: 2000,
            max_idle_reads: 10,
            pass_timeout_secs: 120,
            listen_window_lines: 4,
            banner_bytes: 50,
        }
    }
}

impl DialogueConfig {
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }
}

/// Ethernet probe settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// TCP port the unit listens on
    pub port: u16,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: 6791,
            connect_timeout_secs: 3,
        }
    }
}

/// External ISP programmer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgrammerConfig {
    /// Path of the ISP tool binary
    pub tool_path: PathBuf,

    /// Programming baud rate (at most 230400)
    pub baud_rate: u32,

    /// Crystal frequency in kHz
    pub osc_khz: u32,

    /// Erase flash before programming
    pub wipe: bool,

    /// Verify after programming
    pub verify: bool,

    /// Ask the tool for its full trace output
    pub debug: bool,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            tool_path: PathBuf::from("./lpc21isp"),
            baud_rate: 230_400,
            osc_khz: 12_000,
            wipe: true,
            verify: true,
            debug: false,
        }
    }
}

/// Firmware image locations
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Image that runs the on-board test sequence
    pub test_image: PathBuf,

    /// Directory holding one deploy image per IP address
    pub deploy_dir: PathBuf,

    /// File name of the deploy image inside each per-IP directory
    pub deploy_image_name: String,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            test_image: PathBuf::from("firmware/test/test-fw.bin"),
            deploy_dir: PathBuf::from("firmware/deploy"),
            deploy_image_name: "firmware.bin".to_string(),
        }
    }
}

impl FirmwareConfig {
    /// Deploy image for a unit committed to `ip`
    pub fn deploy_image(&self, ip: &str) -> PathBuf {
        self.deploy_dir.join(ip).join(&self.deploy_image_name)
    }
}

/// Serial number and address sequencing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// JSON table of boards already tested
    pub table_path: PathBuf,

    /// First three octets of the deploy address pool, with trailing dot
    pub ip_base: String,

    /// First host number of the pool
    pub first_host: u8,

    /// Last host number of the pool
    pub last_host: u8,

    /// Netmask committed with pool addresses
    pub netmask: String,

    /// Gateway committed with pool addresses
    pub gateway: String,

    /// Serial number used when the table is empty
    pub first_sn: String,

    /// MAC used when the table is empty
    pub first_mac: String,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("ip_sn_table.json"),
            ip_base: "10.0.18.".to_string(),
            first_host: 201,
            last_host: 213,
            netmask: "255.255.255.0".to_string(),
            gateway: "10.0.18.1".to_string(),
            first_sn: "CN00001".to_string(),
            first_mac: "020000000001".to_string(),
        }
    }
}
