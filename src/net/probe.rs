//! Ethernet verifier
//!
//! Connects to the TCP server the unit opens during its self-test, delivers the
//! fixed probe payload and closes the connection in an orderly way.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;

/// Payload the unit echoes back on its serial console
pub const PROBE_MESSAGE: &[u8] = b"Test msg!\0";

/// Probe errors
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection refused to {0}")]
    ConnectionRefused(SocketAddr),

    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to deliver probe to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Outcome of the Ethernet step of one dialogue pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum ProbeStatus {
    NotAttempted,
    Delivered,
    Failed(String),
}

/// Anything that can prove the unit's network stack is reachable
pub trait Prober {
    /// Never fails past this boundary; failures are reported in the status
    fn probe(&self, ip: &str) -> ProbeStatus;
}

/// TCP verifier for the unit's test server
#[derive(Clone, Debug)]
pub struct EthernetVerifier {
    port: u16,
    connect_timeout_secs: u64,
}

impl EthernetVerifier {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            port: config.port,
            connect_timeout_secs: config.connect_timeout_secs,
        }
    }

    /// Connect, send the payload, then shut both directions down
    pub fn verify(&self, ip: &str) -> Result<(), ProbeError> {
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| ProbeError::InvalidAddress(ip.to_string()))?;
        let addr = SocketAddr::new(ip, self.port);

        debug!("Connecting to {}", addr);
        let timeout = Duration::from_secs(self.connect_timeout_secs);
        let mut stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                ProbeError::Timeout(self.connect_timeout_secs)
            }
            io::ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused(addr),
            _ => ProbeError::Connect { addr, source: e },
        })?;

        stream
            .write_all(PROBE_MESSAGE)
            .and_then(|_| stream.flush())
            .map_err(|source| ProbeError::Send { addr, source })?;

        // The unit may already have closed its side after reading the payload
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            debug!("Shutdown of {} reported: {}", addr, e);
        }

        Ok(())
    }
}

impl Prober for EthernetVerifier {
    fn probe(&self, ip: &str) -> ProbeStatus {
        match self.verify(ip) {
            Ok(()) => {
                info!("Probe delivered to {}:{}", ip, self.port);
                ProbeStatus::Delivered
            }
            Err(e) => {
                warn!("Probe failed: {}", e);
                ProbeStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    fn verifier(port: u16) -> EthernetVerifier {
        EthernetVerifier::new(&ProbeConfig {
            port,
            ..ProbeConfig::default()
        })
    }

    #[test]
    fn test_probe_delivers_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).unwrap();
            received
        });

        let status = verifier(port).probe("127.0.0.1");
        assert_eq!(status, ProbeStatus::Delivered);

        let received = server.join().unwrap();
        assert_eq!(received, b"Test msg!\0");
    }

    #[test]
    fn test_probe_refused_is_reported_not_raised() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let status = verifier(port).probe("127.0.0.1");
        assert!(matches!(status, ProbeStatus::Failed(_)));
    }

    #[test]
    fn test_invalid_address() {
        let err = verifier(6791).verify("not-an-ip").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidAddress(_)));
    }

    #[test]
    fn test_probe_status_serialization() {
        let json = serde_json::to_string(&ProbeStatus::Failed("refused".into())).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"refused"}"#);
    }
}
