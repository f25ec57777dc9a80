//! Core types for branch-cleaner
//!
//! Pull-request snapshots, per-branch analysis records and the diff payloads
//! handed to a reviewer.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a single pull request as reported by the PR-tracking service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestState {
    Open,
    Merged,
    Closed,
}

impl fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Merged => write!(f, "MERGED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Snapshot of a pull request whose head is a local branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// PR number, unique within one query
    pub number: u64,
    pub state: PullRequestState,
    pub title: String,
    pub url: Option<String>,
    /// Merge commit reported by the service (authoritative when present)
    pub merge_commit: Option<String>,
    /// Branch the PR was merged into
    pub target_branch: Option<String>,
}

/// Authoritative merge details for one pull request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestDetail {
    pub merge_commit: Option<String>,
    pub target_branch: Option<String>,
}

/// Aggregate PR state of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Merged,
    Closed,
    Open,
    NoPr,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => write!(f, "merged"),
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::NoPr => write!(f, "no PR"),
        }
    }
}

/// Deletion verdict for a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    /// Merged and the branch content matches what landed
    SafeToDelete,
    /// Merged, but the branch carries content the merge did not
    ReviewRequired,
    ClosedPr,
    Active,
    NoPr,
}

impl BranchStatus {
    /// Whether the branch can be removed without looking at it
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::SafeToDelete)
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SafeToDelete => write!(f, "safe to delete"),
            Self::ReviewRequired => write!(f, "review required"),
            Self::ClosedPr => write!(f, "closed PR"),
            Self::Active => write!(f, "active"),
            Self::NoPr => write!(f, "no PR"),
        }
    }
}

/// Aggregate numeric diff stat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub files_changed: usize,
}

/// Last commit on a branch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastCommit {
    pub timestamp: Option<DateTime<Utc>>,
    pub author: Option<String>,
}

/// Relationship between a local branch and its remote counterpart
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingInfo {
    pub tracking_ref: Option<String>,
    pub unpushed: usize,
    pub unpulled: usize,
    pub has_remote: bool,
}

/// Result of analyzing one local branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub name: String,
    pub pr_state: PrState,
    pub status: BranchStatus,
    #[serde(default)]
    pub prs: Vec<PullRequestRecord>,
    pub last_commit_date: Option<DateTime<Utc>>,
    pub last_commit_author: Option<String>,
    /// Present exactly when `has_differences` is set
    pub diff_stats: Option<DiffStats>,
    pub has_differences: bool,
    pub tracking_branch: Option<String>,
    pub unpushed_commits: usize,
    pub unpulled_commits: usize,
    pub has_remote_branch: bool,
    pub error: Option<String>,
}

impl BranchRecord {
    /// Record for a branch whose analysis failed
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pr_state: PrState::NoPr,
            status: BranchStatus::NoPr,
            prs: Vec::new(),
            last_commit_date: None,
            last_commit_author: None,
            diff_stats: None,
            has_differences: false,
            tracking_branch: None,
            unpushed_commits: 0,
            unpulled_commits: 0,
            has_remote_branch: false,
            error: Some(error.into()),
        }
    }
}

/// Repository metadata announced at the start of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub path: PathBuf,
    pub remote_url: Option<String>,
    pub main_branch: String,
    pub total_branches: usize,
}

/// Change kind from `git diff --name-status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    TypeChanged,
    Unmerged,
    Unknown,
}

impl FileStatus {
    /// Parse the leading letter of a name-status code (`R100` → `Renamed`)
    pub fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('A') => Self::Added,
            Some('D') => Self::Deleted,
            Some('M') => Self::Modified,
            Some('R') => Self::Renamed,
            Some('C') => Self::Copied,
            Some('T') => Self::TypeChanged,
            Some('U') => Self::Unmerged,
            _ => Self::Unknown,
        }
    }
}

/// One changed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub status: FileStatus,
    pub filename: String,
    /// Source path for renames and copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_filename: Option<String>,
}

/// Before/after content of one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContents {
    pub old: String,
    pub new: String,
}

/// Refs a viewer can use to reproduce a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRefs {
    pub branch: String,
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_parent: Option<String>,
    pub merge_commit: String,
}

/// Reviewer-facing diff pair for one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDiff {
    pub branch_diff: String,
    pub pr_diff: String,
    pub branch_files: Vec<FileChange>,
    pub pr_files: Vec<FileChange>,
    #[serde(default)]
    pub file_contents: BTreeMap<String, FileContents>,
    pub refs: DiffRefs,
    /// Single target-vs-branch view instead of a branch/PR pair
    pub is_merge_base_diff: bool,
}
