//! Patch equivalence
//!
//! Decides whether a branch still carries exactly the content its pull request
//! merged. Only added/removed lines take part in the comparison, as a sorted
//! multiset, so context width, hunk line numbers, blob ids and hunk order do
//! not affect the verdict.

use tracing::{debug, info, instrument};
use xxhash_rust::xxh3::xxh3_64;

use super::repo::GitRepo;
use crate::error::Result;
use crate::types::DiffStats;

/// Outcome of comparing a branch with its merged pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equivalence {
    /// The branch adds nothing beyond what was merged
    Equivalent,
    /// The branch diverges; stats cover the branch-vs-target diff
    Diverged(DiffStats),
}

impl Equivalence {
    pub fn has_differences(&self) -> bool {
        matches!(self, Self::Diverged(_))
    }

    pub fn diff_stats(&self) -> Option<DiffStats> {
        match self {
            Self::Equivalent => None,
            Self::Diverged(stats) => Some(*stats),
        }
    }
}

/// Sorted `+`/`-` lines of a diff, with a content fingerprint
#[derive(Debug, Clone, Eq)]
pub struct ChangedLines {
    lines: Vec<String>,
    fingerprint: u64,
}

impl ChangedLines {
    pub fn from_diff(diff: &str) -> Self {
        let mut lines: Vec<String> = diff
            .lines()
            .filter(|line| is_change_line(line))
            .map(str::to_string)
            .collect();
        lines.sort_unstable();

        let fingerprint = xxh3_64(lines.join("\n").as_bytes());
        Self { lines, fingerprint }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl PartialEq for ChangedLines {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.lines == other.lines
    }
}

/// `+`/`-` content lines, excluding the `+++`/`---` file headers
fn is_change_line(line: &str) -> bool {
    (line.starts_with('+') || line.starts_with('-'))
        && !line.starts_with("+++")
        && !line.starts_with("---")
}

/// Compare the branch's three-dot diff against `target` with the merge
/// commit's diff against its first parent
///
/// Stats are only computed when the two sides differ.
#[instrument(skip(repo))]
pub async fn compare_with_merge(
    repo: &GitRepo,
    branch: &str,
    target: &str,
    merge_commit: &str,
) -> Result<Equivalence> {
    let branch_range = format!("{target}...{branch}");
    let merge_range = format!("{merge_commit}^1...{merge_commit}");

    let branch_changes = ChangedLines::from_diff(&repo.diff(&branch_range).await?);
    let merge_changes = ChangedLines::from_diff(&repo.diff(&merge_range).await?);

    debug!(
        "Branch {} has {} changed lines ({:016x}), merge {} has {} ({:016x})",
        branch,
        branch_changes.len(),
        branch_changes.fingerprint(),
        merge_commit,
        merge_changes.len(),
        merge_changes.fingerprint()
    );

    if branch_changes == merge_changes {
        return Ok(Equivalence::Equivalent);
    }

    info!("Branch {} has different changes than merged PR", branch);
    let stats = repo.numstat(&branch_range).await?;
    Ok(Equivalence::Diverged(stats))
}

/// Sum `git diff --numstat` output
///
/// Binary files (`-\t-\tpath`) count as changed files with no line counts.
pub fn parse_numstat(output: &str) -> DiffStats {
    let mut stats = DiffStats::default();

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.splitn(3, '\t');
        let (Some(added), Some(removed), Some(_path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        stats.additions += added.parse::<usize>().unwrap_or(0);
        stats.deletions += removed.parse::<usize>().unwrap_or(0);
        stats.files_changed += 1;
    }

    stats
}
