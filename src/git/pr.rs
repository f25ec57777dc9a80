//! GitHub PR lookup via `gh` CLI
//!
//! Lists pull requests by head branch and fetches merge details.
//! All failures degrade to empty results: missing `gh`, auth errors, network
//! issues or malformed JSON simply mean "no PRs" / "no detail".

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::executor::CommandRunner;
use crate::types::{PullRequestDetail, PullRequestRecord, PullRequestState};

/// Source of pull-request snapshots
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// All PRs (any state) whose head is `branch`, in service response order
    async fn list_for_branch(&self, branch: &str) -> Vec<PullRequestRecord>;

    /// Authoritative merge commit and target branch for one PR
    async fn get_detail(&self, number: u64) -> Option<PullRequestDetail>;
}

/// PR source backed by the `gh` CLI
pub struct GhCli {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl GhCli {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    async fn gh(&self, args: &[&str]) -> Option<String> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.program.as_str());
        argv.extend_from_slice(args);

        match self.runner.run(&argv).await {
            Ok(output) if output.success() => Some(output.stdout),
            Ok(output) => {
                debug!("gh {} failed: {}", args.join(" "), output.stderr.trim());
                None
            }
            Err(e) => {
                warn!("gh not available: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl PullRequestSource for GhCli {
    async fn list_for_branch(&self, branch: &str) -> Vec<PullRequestRecord> {
        let Some(json) = self
            .gh(&[
                "pr",
                "list",
                "--head",
                branch,
                "--state",
                "all",
                "--json",
                "number,state,mergeCommit,title,url,headRefName,baseRefName,mergedAt",
            ])
            .await
        else {
            warn!("Failed to get PR info for branch {}", branch);
            return Vec::new();
        };

        let mut prs = parse_pr_list(&json);
        info!("Found {} PRs for branch {}", prs.len(), branch);

        for pr in prs.iter_mut().filter(|pr| pr.state == PullRequestState::Merged) {
            if let Some(detail) = self.get_detail(pr.number).await {
                pr.merge_commit = detail.merge_commit.or(pr.merge_commit.take());
                pr.target_branch = detail.target_branch.or(pr.target_branch.take());
            }
        }

        prs
    }

    async fn get_detail(&self, number: u64) -> Option<PullRequestDetail> {
        let number_arg = number.to_string();
        if let Some(json) = self
            .gh(&[
                "pr",
                "view",
                &number_arg,
                "--json",
                "number,state,mergeCommit,baseRefName,mergedAt",
            ])
            .await
        {
            return parse_pr_view(&json);
        }

        let endpoint = format!("repos/:owner/:repo/pulls/{number}");
        let json = self.gh(&["api", &endpoint]).await?;
        parse_api_pull(&json)
    }
}

/// `mergeCommit` arrives as `{"oid": ..}`, a bare string, or null
#[derive(Deserialize)]
#[serde(untagged)]
enum GhMergeCommit {
    Object { oid: Option<String> },
    Sha(String),
}

impl GhMergeCommit {
    fn into_sha(self) -> Option<String> {
        match self {
            Self::Object { oid } => oid,
            Self::Sha(sha) => Some(sha),
        }
        .filter(|s| !s.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    state: PullRequestState,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    merge_commit: Option<GhMergeCommit>,
    #[serde(default)]
    base_ref_name: Option<String>,
}

impl From<GhPullRequest> for PullRequestRecord {
    fn from(pr: GhPullRequest) -> Self {
        Self {
            number: pr.number,
            state: pr.state,
            title: pr.title,
            url: pr.url,
            merge_commit: pr.merge_commit.and_then(GhMergeCommit::into_sha),
            target_branch: pr.base_ref_name.filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequestView {
    #[serde(default)]
    merge_commit: Option<GhMergeCommit>,
    #[serde(default)]
    base_ref_name: Option<String>,
}

#[derive(Deserialize)]
struct ApiBase {
    #[serde(rename = "ref")]
    ref_name: Option<String>,
}

#[derive(Deserialize)]
struct ApiPullRequest {
    #[serde(default)]
    merge_commit_sha: Option<String>,
    #[serde(default)]
    base: Option<ApiBase>,
}

/// Parse `gh pr list --json ...`; malformed payloads yield no PRs
pub fn parse_pr_list(json: &str) -> Vec<PullRequestRecord> {
    match serde_json::from_str::<Vec<GhPullRequest>>(json) {
        Ok(prs) => prs.into_iter().map(Into::into).collect(),
        Err(e) => {
            warn!("Failed to parse PR list: {}", e);
            Vec::new()
        }
    }
}

/// Parse `gh pr view --json ...`
pub fn parse_pr_view(json: &str) -> Option<PullRequestDetail> {
    let view: GhPullRequestView = serde_json::from_str(json)
        .map_err(|e| warn!("Failed to parse PR detail: {}", e))
        .ok()?;
    Some(PullRequestDetail {
        merge_commit: view.merge_commit.and_then(GhMergeCommit::into_sha),
        target_branch: view.base_ref_name.filter(|s| !s.is_empty()),
    })
}

/// Parse the REST `pulls/<n>` payload
pub fn parse_api_pull(json: &str) -> Option<PullRequestDetail> {
    let pull: ApiPullRequest = serde_json::from_str(json)
        .map_err(|e| warn!("Failed to parse PR API response: {}", e))
        .ok()?;
    Some(PullRequestDetail {
        merge_commit: pull.merge_commit_sha.filter(|s| !s.is_empty()),
        target_branch: pull.base.and_then(|b| b.ref_name),
    })
}
