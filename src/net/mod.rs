//! Network verification of the unit
//!
//! Provides the TCP probe used during the Ethernet self-test.

mod probe;

pub use probe::{EthernetVerifier, ProbeStatus, Prober};
