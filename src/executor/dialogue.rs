//! Serial conversation driver
//!
//! Runs one prompt/response pass with the unit. The conversation is a table-driven
//! state machine: each row maps (state, recognised substring) to a response and
//! the next state, so the whole protocol can be read off the tables below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DialogueConfig;
use crate::models::{MacAddress, NetworkIdentity, Transcript};
use crate::net::{ProbeStatus, Prober};
use crate::serial::LineChannel;
use crate::utils::Timer;

const MAC_PROMPT: &str = "Insert MAC:";
const IP_PROMPT: &str = "Insert IP:";
const MASK_PROMPT: &str = "Insert Mask:";
const GATEWAY_PROMPT: &str = "Insert Gateway:";
const ETH_INIT: &str = "Initializing ETH stack";
const LISTENING: &str = "Listening on port: 6791";
pub(crate) const END_OF_TESTS: &str = "End of tests!";

/// Which of the two passes is running
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    /// Self-test with the test-network identity and the Ethernet probe
    Test,
    /// Commits the deployed identity to nonvolatile memory
    Store,
}

impl PassKind {
    /// Command byte that selects the pass after reset
    pub fn start_byte(&self) -> u8 {
        match self {
            PassKind::Test => b's',
            PassKind::Store => b'r',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PassKind::Test => "test",
            PassKind::Store => "store",
        }
    }

    pub fn transitions(&self) -> &'static [Transition] {
        match self {
            PassKind::Test => TEST_PASS,
            PassKind::Store => STORE_PASS,
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Position in the conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogueState {
    AwaitMac,
    AwaitIp,
    AwaitMask,
    AwaitGateway,
    Testing,
    AwaitListen,
    Done,
}

/// Response to a recognised line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    SendMac,
    SendIp,
    SendMask,
    SendGateway,
    Probe,
    Observe,
    Finish,
}

/// One row of a pass table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: DialogueState,
    pub pattern: &'static str,
    pub action: Action,
    pub to: DialogueState,
}

const fn row(
    from: DialogueState,
    pattern: &'static str,
    action: Action,
    to: DialogueState,
) -> Transition {
    Transition {
        from,
        pattern,
        action,
        to,
    }
}

use Action::*;
use DialogueState::*;

// A prompt repeated right after it was answered is answered again.
const TEST_PASS: &[Transition] = &[
    row(AwaitMac, MAC_PROMPT, SendMac, AwaitIp),
    row(AwaitIp, MAC_PROMPT, SendMac, AwaitIp),
    row(AwaitIp, IP_PROMPT, SendIp, AwaitMask),
    row(AwaitMask, IP_PROMPT, SendIp, AwaitMask),
    row(AwaitMask, MASK_PROMPT, SendMask, AwaitGateway),
    row(AwaitGateway, MASK_PROMPT, SendMask, AwaitGateway),
    row(AwaitGateway, GATEWAY_PROMPT, SendGateway, Testing),
    row(Testing, GATEWAY_PROMPT, SendGateway, Testing),
    row(Testing, ETH_INIT, Observe, AwaitListen),
    row(Testing, LISTENING, Probe, Testing),
    row(AwaitListen, LISTENING, Probe, Testing),
    row(Testing, END_OF_TESTS, Finish, Done),
];

const STORE_PASS: &[Transition] = &[
    row(AwaitMac, MAC_PROMPT, SendMac, AwaitIp),
    row(AwaitIp, MAC_PROMPT, SendMac, AwaitIp),
    row(AwaitIp, IP_PROMPT, SendIp, AwaitMask),
    row(AwaitMask, IP_PROMPT, SendIp, AwaitMask),
    row(AwaitMask, MASK_PROMPT, SendMask, AwaitGateway),
    row(AwaitGateway, MASK_PROMPT, SendMask, AwaitGateway),
    row(AwaitGateway, GATEWAY_PROMPT, SendGateway, Testing),
    row(Testing, GATEWAY_PROMPT, SendGateway, Testing),
    row(Testing, END_OF_TESTS, Finish, Done),
];

/// First row of `table` that applies to `line` in `state`
pub fn next_transition(
    table: &'static [Transition],
    state: DialogueState,
    line: &str,
) -> Option<&'static Transition> {
    table
        .iter()
        .find(|t| t.from == state && line.contains(t.pattern))
}

/// Why a pass was abandoned
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolError {
    #[error("reset failed: {0}")]
    Reset(String),

    #[error("serial link failed: {0}")]
    Link(String),

    #[error("no response from unit while in {0:?}")]
    Idle(DialogueState),

    #[error("ETH stack initialised but the listening port was never announced")]
    ListenWindow,

    #[error("unit ended the sequence early while in {0:?}")]
    PrematureEnd(DialogueState),

    #[error("line budget of {0} exhausted")]
    LineBudget(usize),

    #[error("pass exceeded {0}s")]
    Deadline(u64),
}

/// How a pass ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PassOutcome {
    Completed,
    Aborted(ProtocolError),
}

impl PassOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed)
    }
}

/// Everything one pass produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialoguePass {
    pub kind: PassKind,
    pub identity: NetworkIdentity,
    pub outcome: PassOutcome,
    pub final_state: DialogueState,
    pub probe: ProbeStatus,
    pub duration_ms: u64,
    pub transcript: Transcript,
}

/// Drives passes over a channel
pub struct DialogueDriver<'a> {
    config: &'a DialogueConfig,
    prober: &'a dyn Prober,
}

impl<'a> DialogueDriver<'a> {
    pub fn new(config: &'a DialogueConfig, prober: &'a dyn Prober) -> Self {
        Self { config, prober }
    }

    /// Reset the unit and run one pass to completion or abort
    pub fn run_pass(
        &self,
        channel: &mut dyn LineChannel,
        kind: PassKind,
        mac: &MacAddress,
        identity: &NetworkIdentity,
    ) -> DialoguePass {
        let timer = Timer::start(format!("{kind} pass"));
        info!("Starting {} pass ({}, MAC {})", kind, identity, mac);

        let mut session = Session {
            kind,
            mac,
            identity,
            state: AwaitMac,
            transcript: Transcript::new(),
            probe: ProbeStatus::NotAttempted,
        };

        let outcome = match self.converse(channel, &mut session) {
            Ok(()) => {
                info!(
                    "{} pass completed ({} lines)",
                    kind,
                    session.transcript.len()
                );
                PassOutcome::Completed
            }
            Err(e) => {
                warn!("{} pass aborted: {}", kind, e);
                PassOutcome::Aborted(e)
            }
        };

        DialoguePass {
            kind,
            identity: identity.clone(),
            outcome,
            final_state: session.state,
            probe: session.probe,
            duration_ms: timer.stop().as_millis() as u64,
            transcript: session.transcript,
        }
    }

    fn converse(
        &self,
        channel: &mut dyn LineChannel,
        session: &mut Session<'_>,
    ) -> Result<(), ProtocolError> {
        channel
            .pulse_reset()
            .map_err(|e| ProtocolError::Reset(e.to_string()))?;
        channel
            .write_all(&[session.kind.start_byte()])
            .map_err(|e| ProtocolError::Link(e.to_string()))?;
        channel
            .discard(self.config.banner_bytes)
            .map_err(|e| ProtocolError::Link(e.to_string()))?;

        let table = session.kind.transitions();
        let deadline = Instant::now() + self.config.pass_timeout();
        let mut idle = 0u32;
        let mut listen_lines = 0usize;

        loop {
            if session.transcript.len() >= self.config.max_lines {
                return Err(ProtocolError::LineBudget(self.config.max_lines));
            }
            if Instant::now() >= deadline {
                return Err(ProtocolError::Deadline(self.config.pass_timeout_secs));
            }

            let line = match channel.read_line() {
                Ok(Some(line)) => line,
                Ok(None) if session.state == AwaitListen => {
                    return Err(ProtocolError::ListenWindow);
                }
                Ok(None) => {
                    idle += 1;
                    if idle >= self.config.max_idle_reads {
                        return Err(ProtocolError::Idle(session.state));
                    }
                    continue;
                }
                Err(e) => return Err(ProtocolError::Link(e.to_string())),
            };
            idle = 0;

            debug!("<< {}", line);
            session.transcript.push(line.as_str());

            match next_transition(table, session.state, &line) {
                Some(t) => {
                    debug!("{:?} -> {:?} on '{}'", t.from, t.to, t.pattern);
                    self.perform(channel, session, t.action)?;
                    session.state = t.to;
                    if session.state == AwaitListen {
                        listen_lines = 0;
                    }
                    if session.state == Done {
                        return Ok(());
                    }
                }
                None if session.state == AwaitListen => {
                    listen_lines += 1;
                    if listen_lines >= self.config.listen_window_lines {
                        return Err(ProtocolError::ListenWindow);
                    }
                }
                None if line.contains(END_OF_TESTS) => {
                    return Err(ProtocolError::PrematureEnd(session.state));
                }
                None => {}
            }
        }
    }

    fn perform(
        &self,
        channel: &mut dyn LineChannel,
        session: &mut Session<'_>,
        action: Action,
    ) -> Result<(), ProtocolError> {
        let reply = match action {
            SendMac => format!("{}\r\n", session.mac.raw()),
            SendIp => format!("{}\n", session.identity.ip),
            SendMask => format!("{}\n", session.identity.mask),
            SendGateway => format!("{}\n", session.identity.gateway),
            Probe => {
                session.probe = self.prober.probe(&session.identity.ip);
                return Ok(());
            }
            Observe | Finish => return Ok(()),
        };

        debug!(">> {}", reply.trim_end());
        channel
            .write_all(reply.as_bytes())
            .map_err(|e| ProtocolError::Link(e.to_string()))
    }
}

struct Session<'s> {
    kind: PassKind,
    mac: &'s MacAddress,
    identity: &'s NetworkIdentity,
    state: DialogueState,
    transcript: Transcript,
    probe: ProbeStatus,
}
