//! Reconciliation pass results

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::core_types::{TransactionId, UserId};

/// What reconciliation did with one incomplete debit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    /// Missing completion credit created, statuses set to success
    Completed,
    /// Stale: refund credit issued, statuses set to failed
    Refunded,
    /// A completion credit already existed; statuses caught up
    AlreadyCompleted,
    /// A refund credit already existed; statuses caught up
    AlreadyRefunded,
    /// Debit is `failed`; nothing to finish
    SkippedFailed,
}

impl RepairAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairAction::Completed => "completed",
            RepairAction::Refunded => "refunded",
            RepairAction::AlreadyCompleted => "already_completed",
            RepairAction::AlreadyRefunded => "already_refunded",
            RepairAction::SkippedFailed => "skipped_failed",
        }
    }
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored balance overwritten with the derived one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resync {
    pub user_id: UserId,
    pub stored: Decimal,
    pub derived: Decimal,
}

/// Item the pass could not repair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    /// Debit id or user id
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub completed: Vec<TransactionId>,
    pub refunded: Vec<TransactionId>,
    pub already_completed: Vec<TransactionId>,
    pub already_refunded: Vec<TransactionId>,
    pub resynced: Vec<Resync>,
    pub skipped: Vec<Skipped>,
}

impl ReconcileReport {
    pub fn record(&mut self, debit_id: TransactionId, action: RepairAction) {
        match action {
            RepairAction::Completed => self.completed.push(debit_id),
            RepairAction::Refunded => self.refunded.push(debit_id),
            RepairAction::AlreadyCompleted => self.already_completed.push(debit_id),
            RepairAction::AlreadyRefunded => self.already_refunded.push(debit_id),
            RepairAction::SkippedFailed => self.skip(debit_id.to_string(), "debit already failed"),
        }
    }

    pub fn skip(&mut self, id: String, reason: impl Into<String>) {
        self.skipped.push(Skipped {
            id,
            reason: reason.into(),
        });
    }

    /// Number of debits moved to a terminal state
    pub fn repaired(&self) -> usize {
        self.completed.len()
            + self.refunded.len()
            + self.already_completed.len()
            + self.already_refunded.len()
    }

    /// True if the pass found nothing to do
    pub fn is_clean(&self) -> bool {
        self.repaired() == 0 && self.resynced.is_empty() && self.skipped.is_empty()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completed={} refunded={} already_completed={} already_refunded={} resynced={} skipped={}",
            self.completed.len(),
            self.refunded.len(),
            self.already_completed.len(),
            self.already_refunded.len(),
            self.resynced.len(),
            self.skipped.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let mut report = ReconcileReport::default();
        assert!(report.is_clean());

        report.record("d1".into(), RepairAction::Completed);
        report.record("d2".into(), RepairAction::AlreadyRefunded);
        report.record("d3".into(), RepairAction::SkippedFailed);

        assert_eq!(report.repaired(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert!(!report.is_clean());
        assert_eq!(
            report.to_string(),
            "completed=1 refunded=0 already_completed=0 already_refunded=1 resynced=0 skipped=1"
        );
    }
}
