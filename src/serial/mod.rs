//! Serial link to the unit
//!
//! A line-oriented channel abstraction over the UART, so the dialogue driver can
//! be exercised against a scripted line source as well as real hardware.

mod port;
#[cfg(test)]
pub mod scripted;

pub use port::SerialOpener;

use thiserror::Error;

/// Serial channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to drive control lines: {0}")]
    Control(#[source] serialport::Error),

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Line-oriented, timeout-bounded conversation with the unit
pub trait LineChannel {
    /// Next line without its terminator.
    ///
    /// Returns `Ok(None)` when the read window elapsed with nothing received. A
    /// partial line pending when the window elapses is returned as a line, since
    /// prompts are not newline-terminated.
    fn read_line(&mut self) -> Result<Option<String>, ChannelError>;

    /// Write raw bytes to the unit
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// Toggle the control lines to force the unit through a reset
    fn pulse_reset(&mut self) -> Result<(), ChannelError>;

    /// Read and drop up to `max_bytes` (boot banner); returns how many were dropped
    fn discard(&mut self, max_bytes: usize) -> Result<usize, ChannelError>;
}

/// Opens a fresh channel for every run
pub trait ChannelOpener {
    fn open(&self) -> Result<Box<dyn LineChannel>, ChannelError>;
}

impl<C: LineChannel + ?Sized> LineChannel for Box<C> {
    fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        (**self).read_line()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        (**self).write_all(bytes)
    }

    fn pulse_reset(&mut self) -> Result<(), ChannelError> {
        (**self).pulse_reset()
    }

    fn discard(&mut self, max_bytes: usize) -> Result<usize, ChannelError> {
        (**self).discard(max_bytes)
    }
}

/// Strip the line terminator and decode lossily
pub(crate) fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
