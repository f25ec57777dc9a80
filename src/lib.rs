//! Branch Cleaner - decide which local git branches are safe to delete
//!
//! Each local branch is reconciled with its pull-request history. A branch
//! whose PR was merged is only reported safe when its content matches what the
//! merge actually brought into the target branch, so branches that were
//! amended, rebased or extended after merging are flagged for review.
//!
//! # Modules
//!
//! - [`git`] - Command execution, repository operations, PR lookup,
//!   merge-commit resolution, patch equivalence and reviewer diffs
//! - [`analysis`] - Classification, per-branch analysis and the streaming session
//! - [`config`] - Layered configuration
//! - [`types`] - Records shared across modules and the wire
//! - [`error`] - Error types

pub mod analysis;
pub mod config;
pub mod error;
pub mod git;
pub mod types;

#[cfg(test)]
mod test_support;

pub use analysis::{AnalysisSession, BranchAnalyzer, ControlMessage, Event, Inbound, SessionId};
pub use config::Config;
pub use error::{Error, Result};
pub use types::{BranchDiff, BranchRecord, BranchStatus, PrState, RepoInfo};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
