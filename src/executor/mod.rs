//! Test execution engine
//!
//! Drives the serial dialogue with the unit and sequences a full station run.

mod dialogue;
mod runner;

pub use dialogue::DialoguePass;
pub(crate) use dialogue::END_OF_TESTS;
pub use runner::Station;
