//! Run orchestration.
//!
//! - [`checksum`] - SHA-256 of downloads and produced archives
//! - [`orchestrator`] - the [`Pipeline`] driving every stage
//! - [`toolchain`] - external tool resolution

pub mod checksum;
mod orchestrator;
mod toolchain;

pub use orchestrator::{ArchiveSummary, BuildReport, GroupSummary, Pipeline, TargetSummary};
pub use toolchain::Toolchain;
