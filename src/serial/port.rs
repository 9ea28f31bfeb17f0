//! Hardware serial port channel

use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::thread::sleep;
use std::time::Duration;
use tracing::debug;

use super::{decode_line, ChannelError, ChannelOpener, LineChannel};
use crate::config::SerialConfig;

/// UART channel to the unit
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
    reset_hold: Duration,
}

impl SerialChannel {
    /// Open the configured port; the input buffer is cleared before use
    pub fn open(config: &SerialConfig) -> Result<Self, ChannelError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout())
            .open()
            .map_err(|source| ChannelError::Open {
                port: config.port.clone(),
                source,
            })?;

        port.clear(ClearBuffer::All)
            .map_err(ChannelError::Control)?;

        debug!(
            "Opened {} at {} baud ({}ms read timeout)",
            config.port, config.baud_rate, config.read_timeout_ms
        );

        Ok(Self {
            port,
            pending: Vec::new(),
            reset_hold: config.reset_hold(),
        })
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        Some(decode_line(&raw))
    }
}

impl LineChannel for SerialChannel {
    fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            match self.port.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    let raw = std::mem::take(&mut self.pending);
                    return Ok(Some(decode_line(&raw)));
                }
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn pulse_reset(&mut self) -> Result<(), ChannelError> {
        self.port
            .write_data_terminal_ready(true)
            .map_err(ChannelError::Control)?;
        self.port
            .write_request_to_send(false)
            .map_err(ChannelError::Control)?;
        sleep(self.reset_hold);
        self.port
            .write_request_to_send(true)
            .map_err(ChannelError::Control)?;
        sleep(self.reset_hold);

        self.pending.clear();
        self.port
            .clear(ClearBuffer::Input)
            .map_err(ChannelError::Control)?;
        Ok(())
    }

    fn discard(&mut self, max_bytes: usize) -> Result<usize, ChannelError> {
        let mut dropped = self.pending.len().min(max_bytes);
        self.pending = self.pending.split_off(dropped);

        let mut buf = vec![0u8; max_bytes];
        while dropped < max_bytes {
            match self.port.read(&mut buf[..max_bytes - dropped]) {
                Ok(0) => break,
                Ok(n) => dropped += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
        Ok(dropped)
    }
}

/// Opens the configured hardware port
pub struct SerialOpener {
    config: SerialConfig,
}

impl SerialOpener {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl ChannelOpener for SerialOpener {
    fn open(&self) -> Result<Box<dyn LineChannel>, ChannelError> {
        Ok(Box::new(SerialChannel::open(&self.config)?))
    }
}
