//! Repository handle
//!
//! Wraps a [`CommandRunner`] with the git plumbing the analysis needs.
//! Discovery uses gitoxide; everything else shells out to git.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::DateTime;
use tracing::{debug, info, instrument, warn};

use super::diff::parse_name_status;
use super::equivalence::parse_numstat;
use super::executor::{CommandOutput, CommandRunner};
use crate::error::{DeleteError, GitError, Result};
use crate::types::{DiffStats, FileChange, LastCommit, TrackingInfo};

/// Trunk names tried when the remote has no default-branch pointer
pub const TRUNK_CANDIDATES: [&str; 2] = ["main", "master"];

/// Git operations against one repository
#[derive(Clone)]
pub struct GitRepo {
    runner: Arc<dyn CommandRunner>,
    path: PathBuf,
    git: String,
    remote: String,
}

impl GitRepo {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        path: impl Into<PathBuf>,
        git_program: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            path: path.into(),
            git: git_program.into(),
            remote: remote.into(),
        }
    }

    /// Find the working-tree root containing `path` (searches parent directories)
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn discover(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();

        let repo = gix::discover(path).map_err(|_e| GitError::NotARepository(path.to_path_buf()))?;

        let root = repo
            .work_dir()
            .map(Path::to_path_buf)
            .ok_or_else(|| GitError::NotARepository(path.to_path_buf()))?;

        debug!("Discovered repository at {:?}", root);
        Ok(root)
    }

    /// Get the repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Run a git subcommand
    pub async fn git(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.git.as_str());
        argv.extend_from_slice(args);
        self.runner.run(&argv).await
    }

    /// Run a git subcommand that must succeed
    async fn git_ok(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.git(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                command: format!("{} {}", self.git, args.join(" ")),
                stderr: output.stderr.trim().to_string(),
            }
            .into())
        }
    }

    async fn ref_exists(&self, rev: &str) -> Result<bool> {
        Ok(self
            .git(&["rev-parse", "--verify", "--quiet", rev])
            .await?
            .success())
    }

    /// Detect the trunk branch: remote HEAD, then `main`/`master`, else `main`
    #[instrument(skip(self))]
    pub async fn detect_trunk(&self) -> Result<String> {
        let head_ref = format!("refs/remotes/{}/HEAD", self.remote);
        let output = self.git(&["symbolic-ref", &head_ref]).await?;
        if let Some(target) = output.trimmed() {
            let prefix = format!("refs/remotes/{}/", self.remote);
            let trunk = target.strip_prefix(&prefix).unwrap_or(target).to_string();
            info!("Main branch detected from remote HEAD: {}", trunk);
            return Ok(trunk);
        }

        for candidate in TRUNK_CANDIDATES {
            let remote_ref = format!("refs/remotes/{}/{}", self.remote, candidate);
            let local_ref = format!("refs/heads/{}", candidate);
            if self.ref_exists(&remote_ref).await? || self.ref_exists(&local_ref).await? {
                info!("Main branch detected by probing: {}", candidate);
                return Ok(candidate.to_string());
            }
        }

        warn!("Could not detect main branch, defaulting to 'main'");
        Ok("main".to_string())
    }

    pub async fn remote_url(&self) -> Result<Option<String>> {
        let output = self.git(&["remote", "get-url", &self.remote]).await?;
        Ok(output.trimmed().map(str::to_string))
    }

    /// All local branch names in refname order
    ///
    /// Lists `refs/heads` directly so a detached HEAD never shows up as a branch.
    pub async fn local_branches(&self) -> Result<Vec<String>> {
        let output = self
            .git_ok(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Best-effort fetch; returns whether it succeeded
    pub async fn fetch(&self) -> Result<bool> {
        let output = self.git(&["fetch", &self.remote]).await?;
        if !output.success() {
            warn!("Git fetch failed: {}", output.stderr.trim());
        }
        Ok(output.success())
    }

    pub async fn last_commit(&self, branch: &str) -> Result<LastCommit> {
        let output = self
            .git(&["log", "-1", "--format=%at|%an", branch, "--"])
            .await?;
        Ok(output.trimmed().map(parse_last_commit).unwrap_or_default())
    }

    /// Remote counterpart and ahead/behind counts
    #[instrument(skip(self))]
    pub async fn tracking_info(&self, branch: &str) -> Result<TrackingInfo> {
        let tracking = format!("{}/{}", self.remote, branch);

        let mut has_remote = self.remote_branch_exists(branch).await?;
        if !has_remote {
            has_remote = self.ref_exists(&tracking).await?;
        }
        if !has_remote {
            debug!("Remote branch {} does not exist", tracking);
            return Ok(TrackingInfo::default());
        }

        let unpushed = self.count_commits(&format!("{tracking}..{branch}")).await?;
        let unpulled = self.count_commits(&format!("{branch}..{tracking}")).await?;
        if unpushed > 0 || unpulled > 0 {
            info!(
                "Branch {}: {} unpushed, {} unpulled (tracking {})",
                branch, unpushed, unpulled, tracking
            );
        }

        Ok(TrackingInfo {
            tracking_ref: Some(tracking),
            unpushed,
            unpulled,
            has_remote,
        })
    }

    async fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        let output = self
            .git(&["ls-remote", "--heads", &self.remote, branch])
            .await?;
        Ok(output.trimmed().is_some())
    }

    async fn count_commits(&self, range: &str) -> Result<usize> {
        let output = self.git(&["rev-list", "--count", range]).await?;
        Ok(output
            .trimmed()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0))
    }

    /// Delete a local branch and, optionally, its remote counterpart
    ///
    /// Stops at the first failure. A remote failure means the local branch is
    /// already gone.
    #[instrument(skip(self))]
    pub async fn delete_branch(&self, branch: &str, delete_remote: bool) -> Result<()> {
        let output = self.git(&["branch", "-D", branch]).await?;
        if !output.success() {
            return Err(DeleteError::Local {
                branch: branch.to_string(),
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }
        info!("Deleted local branch {}", branch);

        if delete_remote && self.remote_branch_exists(branch).await? {
            let output = self
                .git(&["push", &self.remote, "--delete", branch])
                .await?;
            if !output.success() {
                return Err(DeleteError::Remote {
                    branch: branch.to_string(),
                    stderr: output.stderr.trim().to_string(),
                }
                .into());
            }
            info!("Deleted remote branch {}/{}", self.remote, branch);
        }

        Ok(())
    }

    pub async fn checkout(&self, branch: &str) -> Result<()> {
        self.git_ok(&["checkout", branch]).await?;
        Ok(())
    }

    pub async fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>> {
        let output = self.git(&["merge-base", a, b]).await?;
        Ok(output.trimmed().map(str::to_string))
    }

    /// Full textual diff for a revision range (`a...b`, `a..b`, `a b`)
    pub async fn diff(&self, range: &str) -> Result<String> {
        Ok(self.git_ok(&["diff", "--no-color", range, "--"]).await?.stdout)
    }

    pub async fn name_status(&self, range: &str) -> Result<Vec<FileChange>> {
        let output = self
            .git_ok(&["diff", "--name-status", "-z", range, "--"])
            .await?;
        Ok(parse_name_status(&output.stdout))
    }

    pub async fn numstat(&self, range: &str) -> Result<DiffStats> {
        let output = self.git_ok(&["diff", "--numstat", range, "--"]).await?;
        Ok(parse_numstat(&output.stdout))
    }

    /// File content at a revision, empty when the path does not exist there
    pub async fn show_file(&self, rev: &str, path: &str) -> Result<String> {
        let spec = format!("{rev}:{path}");
        let output = self.git(&["show", &spec]).await?;
        Ok(if output.success() {
            output.stdout
        } else {
            String::new()
        })
    }
}

/// Parse `%at|%an`
fn parse_last_commit(line: &str) -> LastCommit {
    let Some((ts, author)) = line.split_once('|') else {
        return LastCommit::default();
    };
    match ts.trim().parse::<i64>() {
        Ok(secs) => LastCommit {
            timestamp: DateTime::from_timestamp(secs, 0),
            author: Some(author.to_string()),
        },
        Err(_) => LastCommit::default(),
    }
}
