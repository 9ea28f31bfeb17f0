//! Firmware programming
//!
//! Flashes images onto the unit through its serial bootloader by driving the
//! external `lpc21isp` tool.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ProgrammerConfig;
use crate::utils::Timer;

/// Exit code the ISP tool reports after a successful download
pub const ISP_SUCCESS: i32 = 10;

/// Fastest baud rate the bootloader accepts
pub const MAX_ISP_BAUD: u32 = 230_400;

/// Programming errors
#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("Firmware image must be .bin or .hex: {0}")]
    UnsupportedImage(PathBuf),

    #[error("Firmware image not found: {0}")]
    MissingImage(PathBuf),

    #[error("Baud rate {0} exceeds the bootloader limit of 230400")]
    BaudTooHigh(u32),

    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Programming failed with exit code {0}")]
    ExitCode(i32),

    #[error("Programmer was terminated by a signal")]
    Terminated,
}

/// Anything that can put an image on the unit
pub trait FirmwareProgrammer {
    fn program(&self, image: &Path, port: &str) -> Result<(), ProgramError>;
}

/// `lpc21isp` driver
#[derive(Clone, Debug)]
pub struct Lpc21Isp {
    tool: PathBuf,
    baud_rate: u32,
    osc_khz: u32,
    wipe: bool,
    verify: bool,
    debug: bool,
}

impl Lpc21Isp {
    pub fn new(config: &ProgrammerConfig) -> Result<Self, ProgramError> {
        if config.baud_rate > MAX_ISP_BAUD {
            return Err(ProgramError::BaudTooHigh(config.baud_rate));
        }

        Ok(Self {
            tool: config.tool_path.clone(),
            baud_rate: config.baud_rate,
            osc_khz: config.osc_khz,
            wipe: config.wipe,
            verify: config.verify,
            debug: config.debug,
        })
    }

    /// Command line for one download; the image must come after all options
    pub fn arguments(&self, image: &Path, port: &str) -> Result<Vec<OsString>, ProgramError> {
        let format = match image.extension().and_then(|e| e.to_str()) {
            Some("bin") => "-bin",
            Some("hex") => "-hex",
            _ => return Err(ProgramError::UnsupportedImage(image.to_path_buf())),
        };

        let mut args: Vec<OsString> = vec!["-control".into()];
        args.push(if self.debug { "-debug5" } else { "-debug0" }.into());
        if self.wipe {
            args.push("-wipe".into());
        }
        if self.verify {
            args.push("-verify".into());
        }
        args.push(format.into());
        args.push(image.as_os_str().to_owned());
        args.push(port.into());
        args.push(self.baud_rate.to_string().into());
        args.push(self.osc_khz.to_string().into());

        Ok(args)
    }
}

impl FirmwareProgrammer for Lpc21Isp {
    fn program(&self, image: &Path, port: &str) -> Result<(), ProgramError> {
        let args = self.arguments(image, port)?;
        if !image.is_file() {
            return Err(ProgramError::MissingImage(image.to_path_buf()));
        }

        info!("Programming {} over {}", image.display(), port);
        let timer = Timer::start("programming");

        let output = Command::new(&self.tool)
            .args(&args)
            .output()
            .map_err(|source| ProgramError::Spawn {
                tool: self.tool.clone(),
                source,
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("isp: {}", line);
        }

        match output.status.code() {
            Some(ISP_SUCCESS) => {
                info!("Programmed {} in {:.1}s", image.display(), timer.elapsed_secs());
                Ok(())
            }
            Some(code) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!("isp stderr: {}", stderr.trim());
                Err(ProgramError::ExitCode(code))
            }
            None => Err(ProgramError::Terminated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_arguments_order() {
        let isp = Lpc21Isp::new(&ProgrammerConfig::default()).unwrap();
        let args = isp
            .arguments(Path::new("fw/test.bin"), "/dev/ttyUSB0")
            .unwrap();

        assert_eq!(
            strings(args),
            vec![
                "-control",
                "-debug0",
                "-wipe",
                "-verify",
                "-bin",
                "fw/test.bin",
                "/dev/ttyUSB0",
                "230400",
                "12000"
            ]
        );
    }

    #[test]
    fn test_arguments_hex_without_options() {
        let config = ProgrammerConfig {
            wipe: false,
            verify: false,
            debug: true,
            baud_rate: 115_200,
            ..ProgrammerConfig::default()
        };
        let isp = Lpc21Isp::new(&config).unwrap();
        let args = strings(isp.arguments(Path::new("deploy.hex"), "COM3").unwrap());

        assert_eq!(args[..3], ["-control", "-debug5", "-hex"]);
        assert_eq!(args[5], "115200");
    }

    #[test]
    fn test_unsupported_extension() {
        let isp = Lpc21Isp::new(&ProgrammerConfig::default()).unwrap();
        let err = isp.arguments(Path::new("fw.elf"), "/dev/ttyUSB0").unwrap_err();
        assert!(matches!(err, ProgramError::UnsupportedImage(_)));
    }

    #[test]
    fn test_baud_limit() {
        let config = ProgrammerConfig {
            baud_rate: 460_800,
            ..ProgrammerConfig::default()
        };
        assert!(matches!(
            Lpc21Isp::new(&config),
            Err(ProgramError::BaudTooHigh(460_800))
        ));
    }

    #[test]
    fn test_missing_image() {
        let isp = Lpc21Isp::new(&ProgrammerConfig::default()).unwrap();
        let err = isp
            .program(Path::new("/nonexistent/fw.bin"), "/dev/ttyUSB0")
            .unwrap_err();
        assert!(matches!(err, ProgramError::MissingImage(_)));
    }

    #[test]
    fn test_missing_tool() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("fw.bin");
        std::fs::write(&image, [0u8; 16]).unwrap();

        let config = ProgrammerConfig {
            tool_path: dir.path().join("no-such-isp"),
            ..ProgrammerConfig::default()
        };
        let err = Lpc21Isp::new(&config)
            .unwrap()
            .program(&image, "/dev/ttyUSB0")
            .unwrap_err();
        assert!(matches!(err, ProgramError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_zero_exit_is_not_success() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("fw.bin");
        std::fs::write(&image, [0u8; 16]).unwrap();

        let config = ProgrammerConfig {
            tool_path: PathBuf::from("true"),
            ..ProgrammerConfig::default()
        };
        let err = Lpc21Isp::new(&config)
            .unwrap()
            .program(&image, "/dev/ttyUSB0")
            .unwrap_err();
        assert!(matches!(err, ProgramError::ExitCode(0)));
    }
}
