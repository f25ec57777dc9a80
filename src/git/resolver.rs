//! Merge-commit resolution
//!
//! Maps a pull request to the commit on its target branch that merged it.
//! A server-reported merge commit wins outright. Otherwise the target's log is
//! searched for the PR number in the forms produced by squash merges
//! (`(#N)`), rebase merges (`#N`) and merge commits (`Merge pull request #N`).

use tracing::{debug, info, warn};

use super::repo::GitRepo;
use crate::error::ResolutionFailure;
use crate::types::PullRequestRecord;

/// Record separator between commits in the log output
const RECORD_SEP: char = '\u{1e}';
/// Field separator between hash and message
const FIELD_SEP: char = '\u{1f}';

/// Where a merge commit came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeSource {
    /// Reported by the PR-tracking service
    Server,
    /// Found by searching commit messages for this pattern
    MessagePattern(String),
}

/// A resolved merge commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCommit {
    pub id: String,
    pub target_branch: String,
    pub source: MergeSource,
}

/// Message patterns in priority order
pub fn grep_patterns(pr_number: u64) -> [String; 4] {
    [
        format!("(#{pr_number})"),
        format!("#{pr_number}"),
        format!("Merge pull request #{pr_number}"),
        format!("Merge PR #{pr_number}"),
    ]
}

/// Resolve the merge commit of `pr`, searching its target branch (or `default_target`)
pub async fn resolve(
    repo: &GitRepo,
    pr: &PullRequestRecord,
    default_target: &str,
) -> Result<MergeCommit, ResolutionFailure> {
    let target = pr.target_branch.as_deref().unwrap_or(default_target);

    if let Some(id) = &pr.merge_commit {
        debug!("Using merge commit from PR info for PR #{}: {}", pr.number, id);
        return Ok(MergeCommit {
            id: id.clone(),
            target_branch: target.to_string(),
            source: MergeSource::Server,
        });
    }

    search_log(repo, pr.number, target).await
}

/// Search `target`'s history for a commit whose message references `pr_number`
///
/// The first pattern with a match wins; among its matches the most recent
/// commit is returned. A match must not continue into further digits, so
/// `#12` does not satisfy a search for `#1`.
pub async fn search_log(
    repo: &GitRepo,
    pr_number: u64,
    target: &str,
) -> Result<MergeCommit, ResolutionFailure> {
    info!("Searching for merge commit for PR #{} in '{}'", pr_number, target);

    for pattern in grep_patterns(pr_number) {
        let grep = format!("--grep={pattern}");
        let output = match repo
            .git(&[
                "log",
                target,
                "--fixed-strings",
                &grep,
                "--format=%H%x1f%B%x1e",
                "--",
            ])
            .await
        {
            Ok(output) if output.success() => output,
            Ok(output) => {
                debug!("git log on '{}' failed: {}", target, output.stderr.trim());
                continue;
            }
            Err(e) => {
                warn!("git log on '{}' could not run: {}", target, e);
                continue;
            }
        };

        if let Some(id) = first_exact_match(&output.stdout, &pattern) {
            info!(
                "Found merge commit {} for PR #{} using pattern '{}'",
                id, pr_number, pattern
            );
            return Ok(MergeCommit {
                id,
                target_branch: target.to_string(),
                source: MergeSource::MessagePattern(pattern),
            });
        }
    }

    warn!("Could not find merge commit for PR #{} in {}", pr_number, target);
    Err(ResolutionFailure::MergeCommitNotFound {
        pr_number,
        target_branch: target.to_string(),
    })
}

/// First commit (log order, newest first) whose message contains `pattern`
/// not followed by another digit
fn first_exact_match(log: &str, pattern: &str) -> Option<String> {
    log.split(RECORD_SEP)
        .filter_map(|record| record.trim_start().split_once(FIELD_SEP))
        .find(|(_, message)| mentions(message, pattern))
        .map(|(hash, _)| hash.trim().to_string())
}

/// Any occurrence of `pattern` in `message` that is not followed by a digit
fn mentions(message: &str, pattern: &str) -> bool {
    message.match_indices(pattern).any(|(idx, found)| {
        !message[idx + found.len()..].starts_with(|c: char| c.is_ascii_digit())
    })
}
