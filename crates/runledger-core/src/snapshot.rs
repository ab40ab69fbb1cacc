//! Running counts for the current process's view of the run. Pure arithmetic;
//! mutation happens only on the orchestrator's event path.

use crate::model::{CaseId, Outcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Authoritative counters for one logical run.
///
/// Invariant: `completed == passed + failed + skipped` after every
/// [`advance`](Self::advance). `completed <= total` except transiently, when
/// `total` is revised upward by a later-discovered batch at merge time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub completed: u64,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub failed_case_ids: BTreeSet<CaseId>,
}

impl RunSnapshot {
    pub fn with_total(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Record one finished test. Case IDs are folded into the failed set only
    /// for failures; duplicates are absorbed by set semantics.
    pub fn advance(&mut self, outcome: Outcome, case_ids: &[CaseId]) {
        self.completed += 1;
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Failed => {
                self.failed += 1;
                self.failed_case_ids.extend(case_ids.iter().cloned());
            }
            Outcome::Skipped => self.skipped += 1,
        }
    }

    /// Fold a prior batch's snapshot into this one. Counters add, the failed
    /// set unions, `total` takes the max of the two views.
    pub fn merge_from(&mut self, prior: &RunSnapshot) {
        self.completed += prior.completed;
        self.passed += prior.passed;
        self.failed += prior.failed;
        self.skipped += prior.skipped;
        self.total = self.total.max(prior.total);
        self.failed_case_ids
            .extend(prior.failed_case_ids.iter().cloned());
    }

    /// Fraction complete in `[0, 1]`; 0 when nothing is planned yet.
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Failed case IDs, deduplicated and sorted (numeric suffix first, lexical
    /// fallback — see [`CaseId`] ordering).
    pub fn sorted_failed_case_ids(&self) -> Vec<CaseId> {
        self.failed_case_ids.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<CaseId> {
        raw.iter().map(|s| CaseId::new(*s)).collect()
    }

    #[test]
    fn advance_keeps_completed_equal_to_sum() {
        let mut snap = RunSnapshot::with_total(6);
        let seq = [
            (Outcome::Passed, vec![]),
            (Outcome::Failed, ids(&["PHARMA-42"])),
            (Outcome::Skipped, vec![]),
            (Outcome::Failed, ids(&["PHARMA-7"])),
            (Outcome::Passed, vec![]),
            (Outcome::Passed, vec![]),
        ];
        for (outcome, case_ids) in seq {
            snap.advance(outcome, &case_ids);
            assert_eq!(snap.completed, snap.passed + snap.failed + snap.skipped);
        }
        assert_eq!(snap.completed, 6);
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.failed_case_ids.len(), 2);
    }

    #[test]
    fn duplicate_case_ids_collapse() {
        let mut snap = RunSnapshot::with_total(2);
        snap.advance(Outcome::Failed, &ids(&["PHARMA-42"]));
        snap.advance(Outcome::Failed, &ids(&["PHARMA-42"]));
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.failed_case_ids.len(), 1);
    }

    #[test]
    fn case_ids_ignored_unless_failed() {
        let mut snap = RunSnapshot::with_total(1);
        snap.advance(Outcome::Passed, &ids(&["PHARMA-1"]));
        assert!(snap.failed_case_ids.is_empty());
    }

    #[test]
    fn merge_from_is_additive() {
        let mut a = RunSnapshot::with_total(10);
        a.advance(Outcome::Passed, &[]);
        a.advance(Outcome::Failed, &ids(&["PHARMA-3"]));

        let mut b = a.clone();
        b.merge_from(&a);
        assert_eq!(b.completed, 4);
        assert_eq!(b.passed, 2);
        assert_eq!(b.failed, 2);
        assert_eq!(b.total, 10);
        // union, not sum
        assert_eq!(b.failed_case_ids.len(), 1);
    }

    #[test]
    fn merge_takes_max_total() {
        let mut a = RunSnapshot::with_total(5);
        let prior = RunSnapshot::with_total(12);
        a.merge_from(&prior);
        assert_eq!(a.total, 12);
    }

    #[test]
    fn percent_complete_guards_zero_total() {
        let snap = RunSnapshot::default();
        assert_eq!(snap.percent_complete(), 0.0);
        let mut snap = RunSnapshot::with_total(4);
        snap.advance(Outcome::Passed, &[]);
        assert!((snap.percent_complete() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn serde_round_trip_keeps_ids_sorted() {
        let mut snap = RunSnapshot::with_total(3);
        snap.advance(Outcome::Failed, &ids(&["PHARMA-42", "PHARMA-7"]));
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("failedCaseIds"));
        let back: RunSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
        assert_eq!(
            back.sorted_failed_case_ids(),
            ids(&["PHARMA-7", "PHARMA-42"])
        );
    }
}
