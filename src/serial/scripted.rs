//! Scripted line source for driving the dialogue without hardware

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{ChannelError, ChannelOpener, LineChannel};

/// One step the fake unit takes
#[derive(Clone, Debug)]
pub enum Step {
    Line(String),
    /// A read window that elapses with nothing received
    Silence,
    /// An I/O failure on the link
    Broken,
}

/// Everything the driver did to the fake unit
#[derive(Debug, Default)]
pub struct Log {
    pub written: Vec<String>,
    pub resets: usize,
    pub discards: usize,
    pub reads: usize,
}

/// Replays a script; after the script ends every read is silence
pub struct ScriptedChannel {
    script: VecDeque<Step>,
    log: Rc<RefCell<Log>>,
}

impl ScriptedChannel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: steps.into(),
            log: Rc::new(RefCell::new(Log::default())),
        }
    }

    pub fn from_lines(lines: &[&str]) -> Self {
        Self::new(lines.iter().map(|l| Step::Line(l.to_string())).collect())
    }

    /// Shared handle to the interaction log
    pub fn log(&self) -> Rc<RefCell<Log>> {
        Rc::clone(&self.log)
    }
}

impl LineChannel for ScriptedChannel {
    fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        self.log.borrow_mut().reads += 1;
        match self.script.pop_front() {
            Some(Step::Line(line)) => Ok(Some(line)),
            Some(Step::Silence) | None => Ok(None),
            Some(Step::Broken) => Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "link dropped",
            ))),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.log
            .borrow_mut()
            .written
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn pulse_reset(&mut self) -> Result<(), ChannelError> {
        self.log.borrow_mut().resets += 1;
        Ok(())
    }

    fn discard(&mut self, _max_bytes: usize) -> Result<usize, ChannelError> {
        self.log.borrow_mut().discards += 1;
        Ok(0)
    }
}

/// Hands out one pre-built scripted channel
pub struct ScriptedOpener {
    channel: RefCell<Option<ScriptedChannel>>,
}

impl ScriptedOpener {
    pub fn new(channel: ScriptedChannel) -> Self {
        Self {
            channel: RefCell::new(Some(channel)),
        }
    }
}

impl ChannelOpener for ScriptedOpener {
    fn open(&self) -> Result<Box<dyn LineChannel>, ChannelError> {
        match self.channel.borrow_mut().take() {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "scripted channel already used",
            ))),
        }
    }
}
