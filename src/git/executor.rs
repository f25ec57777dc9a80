//! Async process executor with semaphore-controlled concurrency
//!
//! Runs version-control and PR-tracking subcommands:
//! - Arguments are passed as a vector, never through a shell
//! - Output is captured and decoded as text
//! - A non-zero exit is data, not an error; callers inspect `exit_code`

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::error::{GitError, Result};

/// Default maximum concurrent commands
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`-1` when terminated by a signal)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stdout of a successful command, `None` otherwise or when empty
    pub fn trimmed(&self) -> Option<&str> {
        let out = self.stdout.trim();
        (self.success() && !out.is_empty()).then_some(out)
    }
}

/// Runs a command vector (`argv[0]` is the program)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[&str]) -> Result<CommandOutput>;
}

/// Executor bound to a repository working directory
#[derive(Clone)]
pub struct ProcessExecutor {
    cwd: PathBuf,
    /// Semaphore for concurrency control
    semaphore: Arc<Semaphore>,
}

impl ProcessExecutor {
    /// Create a new executor with default settings
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self::with_max_concurrent(cwd, DEFAULT_MAX_CONCURRENT)
    }

    /// Create an executor with custom concurrency limit
    pub fn with_max_concurrent(cwd: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        Self {
            cwd: cwd.into(),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

#[async_trait]
impl CommandRunner for ProcessExecutor {
    #[instrument(skip(self), fields(argv = ?argv))]
    async fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(GitError::Spawn {
                program: String::new(),
                reason: "empty command".to_string(),
            }
            .into());
        };

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| GitError::SemaphoreError)?;

        debug!("Running command: {}", argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GitError::Spawn {
                program: (*program).to_string(),
                reason: e.to_string(),
            })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.success() {
            // Often expected, e.g. a branch without a remote counterpart
            debug!(
                "Command failed with code {}: {}",
                result.exit_code,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let executor = ProcessExecutor::new(temp.path());

        let output = executor
            .run(&["git", "rev-parse", "--verify", "--quiet", "no-such-ref"])
            .await
            .unwrap();
        assert!(!output.success());
        assert!(output.trimmed().is_none());
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_interpolated() {
        let temp = TempDir::new().unwrap();
        let executor = ProcessExecutor::new(temp.path());

        let output = executor
            .run(&["git", "check-ref-format", "--branch", "$(touch pwned); x"])
            .await
            .unwrap();
        assert!(!temp.path().join("pwned").exists());
        assert!(!output.stderr.is_empty() || !output.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let executor = ProcessExecutor::new(temp.path());

        let err = executor
            .run(&["definitely-not-a-real-program-xyz"])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-program-xyz"));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let executor = ProcessExecutor::with_max_concurrent(".", 0);
        assert!(executor.run(&[]).await.is_err());
    }

    #[test]
    fn test_trimmed() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: "  abc\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.trimmed(), Some("abc"));
    }
}
