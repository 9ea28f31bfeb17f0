//! Data models for board bring-up
//!
//! This module contains all data structures shared by the driver, judge and reports.

mod identity;
mod test_result;
mod transcript;

pub use identity::{BoardInfo, MacAddress, NetworkIdentity, RunPlan};
pub use test_result::{
    EthernetResult, FeramResult, Measurement, Subsystem, SubsystemResult,
    SubsystemStatus, TestReport,
};
pub use transcript::Transcript;
