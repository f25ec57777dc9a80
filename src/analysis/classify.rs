//! Branch classification - pure functions
//!
//! No I/O happens here. The analyzer gathers PR snapshots and the equivalence
//! verdict beforehand, which keeps the status rules easy to unit test.

use crate::git::Equivalence;
use crate::types::{BranchStatus, DiffStats, PrState, PullRequestRecord, PullRequestState};

/// Classifier output for one branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub pr_state: PrState,
    pub status: BranchStatus,
    pub has_differences: bool,
    pub diff_stats: Option<DiffStats>,
}

/// Aggregate the PRs of one branch: any open, else any merged, else closed
pub fn aggregate_pr_state(prs: &[PullRequestRecord]) -> PrState {
    if prs.is_empty() {
        PrState::NoPr
    } else if prs.iter().any(|pr| pr.state == PullRequestState::Open) {
        PrState::Open
    } else if prs.iter().any(|pr| pr.state == PullRequestState::Merged) {
        PrState::Merged
    } else {
        PrState::Closed
    }
}

/// The merged PR a branch is compared against: the highest-numbered one
///
/// Service response order is not stable, so the choice must not depend on it.
pub fn select_merged_pr(prs: &[PullRequestRecord]) -> Option<&PullRequestRecord> {
    prs.iter()
        .filter(|pr| pr.state == PullRequestState::Merged)
        .max_by_key(|pr| pr.number)
}

/// Combine PR state and equivalence into a status
///
/// `equivalence` only matters for merged branches. A merged branch without an
/// established equivalence needs review and is reported as differing with
/// zeroed stats, so `diff_stats` stays present exactly when `has_differences`
/// is set.
pub fn classify(prs: &[PullRequestRecord], equivalence: Option<&Equivalence>) -> Classification {
    let pr_state = aggregate_pr_state(prs);

    let settled = |status| Classification {
        pr_state,
        status,
        has_differences: false,
        diff_stats: None,
    };

    match pr_state {
        PrState::NoPr => settled(BranchStatus::NoPr),
        PrState::Open => settled(BranchStatus::Active),
        PrState::Closed => settled(BranchStatus::ClosedPr),
        PrState::Merged => match equivalence {
            Some(Equivalence::Equivalent) => settled(BranchStatus::SafeToDelete),
            Some(Equivalence::Diverged(stats)) => Classification {
                pr_state,
                status: BranchStatus::ReviewRequired,
                has_differences: true,
                diff_stats: Some(*stats),
            },
            None => Classification {
                pr_state,
                status: BranchStatus::ReviewRequired,
                has_differences: true,
                diff_stats: Some(DiffStats::default()),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pr(number: u64, state: PullRequestState) -> PullRequestRecord {
        PullRequestRecord {
            number,
            state,
            title: format!("PR {number}"),
            url: None,
            merge_commit: None,
            target_branch: None,
        }
    }

    fn stats() -> DiffStats {
        DiffStats {
            additions: 1,
            deletions: 0,
            files_changed: 1,
        }
    }

    #[test]
    fn test_no_prs() {
        let c = classify(&[], Some(&Equivalence::Diverged(stats())));
        assert_eq!(c.pr_state, PrState::NoPr);
        assert_eq!(c.status, BranchStatus::NoPr);
        assert!(!c.has_differences);
    }

    #[test]
    fn test_open_wins_over_merged_and_closed() {
        let prs = vec![
            pr(1, PullRequestState::Merged),
            pr(2, PullRequestState::Closed),
            pr(3, PullRequestState::Open),
        ];
        let c = classify(&prs, Some(&Equivalence::Equivalent));
        assert_eq!(c.pr_state, PrState::Open);
        assert_eq!(c.status, BranchStatus::Active);
    }

    #[test]
    fn test_merged_wins_over_closed() {
        let prs = vec![pr(1, PullRequestState::Closed), pr(2, PullRequestState::Merged)];
        assert_eq!(aggregate_pr_state(&prs), PrState::Merged);
    }

    #[test]
    fn test_all_closed() {
        let prs = vec![pr(1, PullRequestState::Closed)];
        let c = classify(&prs, None);
        assert_eq!(c.pr_state, PrState::Closed);
        assert_eq!(c.status, BranchStatus::ClosedPr);
    }

    #[test]
    fn test_merged_equivalent_is_safe() {
        let c = classify(&[pr(1, PullRequestState::Merged)], Some(&Equivalence::Equivalent));
        assert_eq!(c.status, BranchStatus::SafeToDelete);
        assert!(!c.has_differences);
        assert!(c.diff_stats.is_none());
    }

    #[test]
    fn test_merged_diverged_needs_review() {
        let c = classify(
            &[pr(1, PullRequestState::Merged)],
            Some(&Equivalence::Diverged(stats())),
        );
        assert_eq!(c.status, BranchStatus::ReviewRequired);
        assert!(c.has_differences);
        assert_eq!(c.diff_stats, Some(stats()));
    }

    #[test]
    fn test_merged_without_equivalence_needs_review() {
        let c = classify(&[pr(1, PullRequestState::Merged)], None);
        assert_eq!(c.status, BranchStatus::ReviewRequired);
        assert!(c.has_differences);
        assert_eq!(c.diff_stats, Some(DiffStats::default()));
    }

    #[test]
    fn test_select_merged_pr_highest_number() {
        let prs = vec![
            pr(9, PullRequestState::Merged),
            pr(30, PullRequestState::Closed),
            pr(12, PullRequestState::Merged),
        ];
        assert_eq!(select_merged_pr(&prs).map(|p| p.number), Some(12));
        assert!(select_merged_pr(&[pr(1, PullRequestState::Open)]).is_none());
    }

    fn any_state() -> impl Strategy<Value = PullRequestState> {
        prop_oneof![
            Just(PullRequestState::Open),
            Just(PullRequestState::Merged),
            Just(PullRequestState::Closed),
        ]
    }

    fn any_equivalence() -> impl Strategy<Value = Equivalence> {
        prop_oneof![
            Just(Equivalence::Equivalent),
            (1usize..50, 0usize..50, 1usize..5).prop_map(|(a, d, f)| Equivalence::Diverged(
                DiffStats {
                    additions: a,
                    deletions: d,
                    files_changed: f,
                }
            )),
        ]
    }

    fn maybe_equivalence() -> impl Strategy<Value = Option<Equivalence>> {
        prop::option::of(any_equivalence())
    }

    fn any_prs() -> impl Strategy<Value = Vec<PullRequestRecord>> {
        prop::collection::vec((1u64..500, any_state()), 0..6)
            .prop_map(|v| v.into_iter().map(|(n, s)| pr(n, s)).collect())
    }

    proptest! {
        #[test]
        fn prop_classify_is_deterministic(prs in any_prs(), eq in maybe_equivalence()) {
            prop_assert_eq!(classify(&prs, eq.as_ref()), classify(&prs, eq.as_ref()));
        }

        #[test]
        fn prop_order_does_not_matter(prs in any_prs(), eq in any_equivalence()) {
            let mut reversed = prs.clone();
            reversed.reverse();
            prop_assert_eq!(classify(&prs, Some(&eq)), classify(&reversed, Some(&eq)));
            prop_assert_eq!(
                select_merged_pr(&prs).map(|p| p.number),
                select_merged_pr(&reversed).map(|p| p.number)
            );
        }

        #[test]
        fn prop_any_open_means_active(prs in any_prs(), eq in any_equivalence()) {
            let c = classify(&prs, Some(&eq));
            if prs.iter().any(|p| p.state == PullRequestState::Open) {
                prop_assert_eq!(c.pr_state, PrState::Open);
                prop_assert_eq!(c.status, BranchStatus::Active);
            }
        }

        #[test]
        fn prop_stats_iff_differences(prs in any_prs(), eq in maybe_equivalence()) {
            let c = classify(&prs, eq.as_ref());
            prop_assert_eq!(c.diff_stats.is_some(), c.has_differences);
            if c.status == BranchStatus::SafeToDelete {
                prop_assert!(c.pr_state == PrState::Merged && !c.has_differences);
            }
            if c.status == BranchStatus::ReviewRequired {
                prop_assert!(c.pr_state == PrState::Merged && c.has_differences);
            }
        }
    }
}
