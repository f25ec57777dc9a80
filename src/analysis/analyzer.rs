//! Branch analyzer - one engine per repository
//!
//! Coordinates PR lookup, merge-commit resolution and patch equivalence for
//! each local branch, plus the request-style operations (delete, diff,
//! checkout). Constructed explicitly and shared by reference; it holds no
//! per-session state.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::classify::{aggregate_pr_state, classify, select_merged_pr};
use crate::config::Config;
use crate::error::Result;
use crate::git::{
    GhCli, GitRepo, ProcessExecutor, PullRequestSource, TRUNK_CANDIDATES, compare_with_merge,
    present_against_merge, present_against_trunk, resolve,
};
use crate::types::{
    BranchDiff, BranchRecord, PrState, PullRequestRecord, PullRequestState, RepoInfo,
};

/// Analysis engine scoped to one repository
pub struct BranchAnalyzer {
    repo: GitRepo,
    prs: Arc<dyn PullRequestSource>,
    trunk: String,
    remote_url: Option<String>,
}

impl BranchAnalyzer {
    /// Build the engine from configuration: discover the repository, wire the
    /// process executor and `gh`, detect trunk
    #[instrument(skip_all, fields(path = %config.repo_path.display()))]
    pub async fn open(config: &Config) -> Result<Self> {
        let root = GitRepo::discover(&config.repo_path)?;
        info!("Initializing branch analyzer with repo path: {:?}", root);

        let executor = Arc::new(ProcessExecutor::with_max_concurrent(
            &root,
            config.max_concurrent_commands,
        ));
        let repo = GitRepo::new(executor.clone(), root, &config.git_program, &config.remote);
        let prs = Arc::new(GhCli::new(executor, &config.gh_program));

        Self::with_parts(repo, prs, config.trunk.clone()).await
    }

    /// Build the engine from explicit collaborators
    pub async fn with_parts(
        repo: GitRepo,
        prs: Arc<dyn PullRequestSource>,
        trunk: Option<String>,
    ) -> Result<Self> {
        let trunk = match trunk {
            Some(trunk) => trunk,
            None => repo.detect_trunk().await?,
        };
        let remote_url = repo.remote_url().await?;

        Ok(Self {
            repo,
            prs,
            trunk,
            remote_url,
        })
    }

    pub fn trunk(&self) -> &str {
        &self.trunk
    }

    pub fn repo(&self) -> &GitRepo {
        &self.repo
    }

    /// Local branches to analyze: everything except trunk and its aliases
    pub async fn candidate_branches(&self) -> Result<Vec<String>> {
        let all = self.repo.local_branches().await?;
        let branches: Vec<String> = all
            .iter()
            .filter(|b| *b != &self.trunk && !TRUNK_CANDIDATES.contains(&b.as_str()))
            .cloned()
            .collect();

        info!(
            "Found {} total branches, {} to analyze (excluding {})",
            all.len(),
            branches.len(),
            self.trunk
        );
        debug!("Branches to analyze: {:?}", branches);
        Ok(branches)
    }

    pub async fn repo_info(&self) -> Result<RepoInfo> {
        Ok(RepoInfo {
            path: self.repo.path().to_path_buf(),
            remote_url: self.remote_url.clone(),
            main_branch: self.trunk.clone(),
            total_branches: self.candidate_branches().await?.len(),
        })
    }

    /// Refresh remote refs; failures are logged and otherwise ignored
    pub async fn fetch(&self) -> bool {
        match self.repo.fetch().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Git fetch could not run: {}", e);
                false
            }
        }
    }

    /// Analyze one branch
    ///
    /// Never fails: any error becomes a `no_pr` record carrying the message,
    /// so one branch cannot abort a batch.
    pub async fn analyze_branch(&self, branch: &str) -> BranchRecord {
        match self.try_analyze_branch(branch).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Analysis of branch {} failed: {}", branch, e);
                BranchRecord::failed(branch, e.to_string())
            }
        }
    }

    #[instrument(skip(self))]
    async fn try_analyze_branch(&self, branch: &str) -> Result<BranchRecord> {
        let prs = self.prs.list_for_branch(branch).await;
        let last_commit = self.repo.last_commit(branch).await?;
        let tracking = self.repo.tracking_info(branch).await?;

        let equivalence = match select_merged_pr(&prs) {
            Some(merged) if aggregate_pr_state(&prs) == PrState::Merged => {
                let merge = resolve(&self.repo, merged, &self.trunk).await?;
                Some(compare_with_merge(&self.repo, branch, &merge.target_branch, &merge.id).await?)
            }
            _ => None,
        };

        let classification = classify(&prs, equivalence.as_ref());
        debug!(
            "Branch {} classified as {} ({})",
            branch, classification.status, classification.pr_state
        );

        Ok(BranchRecord {
            name: branch.to_string(),
            pr_state: classification.pr_state,
            status: classification.status,
            prs,
            last_commit_date: last_commit.timestamp,
            last_commit_author: last_commit.author,
            diff_stats: classification.diff_stats,
            has_differences: classification.has_differences,
            tracking_branch: tracking.tracking_ref,
            unpushed_commits: tracking.unpushed,
            unpulled_commits: tracking.unpulled,
            has_remote_branch: tracking.has_remote,
            error: None,
        })
    }

    /// Delete a local branch and optionally its remote counterpart (not retried)
    pub async fn delete_branch(&self, branch: &str, delete_remote: bool) -> Result<()> {
        self.repo.delete_branch(branch, delete_remote).await
    }

    pub async fn checkout(&self, branch: &str) -> Result<()> {
        self.repo.checkout(branch).await
    }

    /// Reviewer diff for `branch` against PR `pr_number`; `0` diffs against trunk
    #[instrument(skip(self))]
    pub async fn branch_diff(&self, branch: &str, pr_number: u64) -> Result<BranchDiff> {
        if pr_number == 0 {
            return present_against_trunk(&self.repo, branch, &self.trunk).await;
        }

        let pr = match self
            .prs
            .list_for_branch(branch)
            .await
            .into_iter()
            .find(|p| p.number == pr_number)
        {
            Some(pr) => pr,
            None => {
                let detail = self.prs.get_detail(pr_number).await.unwrap_or_default();
                PullRequestRecord {
                    number: pr_number,
                    state: PullRequestState::Merged,
                    title: String::new(),
                    url: None,
                    merge_commit: detail.merge_commit,
                    target_branch: detail.target_branch,
                }
            }
        };

        let merge = resolve(&self.repo, &pr, &self.trunk).await?;
        present_against_merge(&self.repo, branch, &merge.target_branch, &merge.id).await
    }
}
