//! Git and PR-service plumbing
//!
//! Everything that talks to an external command lives here:
//! - `ProcessExecutor` - Argument-vector command execution
//! - `GitRepo` - Repository operations on top of the executor
//! - `GhCli` - Pull-request lookup through the `gh` CLI
//! - Merge-commit resolution, patch equivalence and reviewer diffs

mod diff;
mod equivalence;
mod executor;
mod pr;
mod repo;
mod resolver;

pub use diff::*;
pub use equivalence::*;
pub use executor::*;
pub use pr::*;
pub use repo::*;
pub use resolver::*;
