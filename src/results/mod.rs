//! Results storage and reporting module
//!
//! Run records, certificates and the board identity table.

mod allocation;
mod report;
mod storage;

pub use allocation::IdentityAllocator;
pub use report::{CertificateRenderer, ReportFormat, ReportRenderer};
pub use storage::{
    DeployStatus, EnvironmentInfo, ExportFormat, PhaseTiming, ResultsStorage, RunInfo, RunRecord,
};

#[cfg(test)]
pub(crate) use storage::fixtures;
