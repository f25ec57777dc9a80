//! Error types for branch-cleaner
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `Display` and `Error` impls.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for branch-cleaner
#[derive(Error, Debug)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("{0}")]
    Resolution(#[from] ResolutionFailure),

    #[error("{0}")]
    Delete(#[from] DeleteError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Git and external command errors
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Failed to start '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Command failed: {command} - {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Semaphore acquire failed")]
    SemaphoreError,
}

/// A pull request whose merge commit cannot be located on its target branch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    #[error(
        "Could not find merge commit for PR #{pr_number} on '{target_branch}'. This might happen if:\n\
         1. The PR was merged with a different commit message convention\n\
         2. The PR was rebased/squashed without the PR number in the commit message\n\
         3. The target branch doesn't contain the merge"
    )]
    MergeCommitNotFound { pr_number: u64, target_branch: String },
}

/// Branch deletion errors
///
/// `Remote` means the local branch is already gone.
#[derive(Error, Debug)]
pub enum DeleteError {
    #[error("Failed to delete local branch '{branch}': {stderr}")]
    Local { branch: String, stderr: String },

    #[error("Deleted local branch '{branch}' but failed to delete remote branch: {stderr}")]
    Remote { branch: String, stderr: String },
}

/// Analysis session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Client disconnected")]
    Disconnected,

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Session aborted: {0}")]
    Aborted(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Failed to create config directory: {0}")]
    DirectoryCreationFailed(PathBuf),
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;
