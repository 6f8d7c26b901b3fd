//! Startup Reconciliation
//!
//! Finishes transfers that a crash or network failure left half-written,
//! then re-syncs every cached balance with its ledger.
//!
//! # Algorithm
//!
//! ```text
//! list transactions
//!   └─ incomplete debits: type=debit, status≠failed, and
//!        (pending  OR  success without any linked credit)
//!        ├─ refund credit exists      → mark failed      (already refunded)
//!        ├─ completion credit exists  → mark success     (already completed)
//!        ├─ older than stale_after    → refund + mark failed
//!        └─ otherwise                 → credit recipient + mark success
//! list users
//!   └─ stored ≠ derived              → overwrite stored
//! ```
//!
//! Debits are processed strictly one after another: two debits to the same
//! recipient would otherwise race on its read-then-write balance update.
//! A failure on one item is logged and skipped; only failing to list
//! transactions or users aborts the pass.
//!
//! Every step checks before it writes, so a second pass over a repaired
//! ledger performs no writes at all.

pub mod report;

pub use report::{ReconcileReport, RepairAction, Resync, Skipped};

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::balance::check_balance;
use crate::config::ReconcileConfig;
use crate::core_types::TransactionId;
use crate::models::{Transaction, TxKind, TxStatus};
use crate::store::{ResourceStore, StoreError};
use crate::transfer::{Settlement, TransferLinks};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("Failed to list transactions: {0}")]
    ListTransactions(#[source] StoreError),

    #[error("Failed to list users: {0}")]
    ListUsers(#[source] StoreError),

    #[error("Transaction {0} is not a transfer debit")]
    NotADebit(TransactionId),

    #[error("Debit {0} has no recipient")]
    MissingRecipient(TransactionId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::ListTransactions(_) => "LIST_TRANSACTIONS_FAILED",
            ReconcileError::ListUsers(_) => "LIST_USERS_FAILED",
            ReconcileError::NotADebit(_) => "NOT_A_DEBIT",
            ReconcileError::MissingRecipient(_) => "MISSING_RECIPIENT",
            ReconcileError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Debits that have not reached a settled terminal state
pub fn incomplete_debits(transactions: &[Transaction]) -> Vec<&Transaction> {
    let credited: HashSet<&TransactionId> = transactions
        .iter()
        .filter(|tx| tx.kind == TxKind::Credit)
        .filter_map(|tx| tx.linked_transaction_id.as_ref())
        .collect();

    transactions
        .iter()
        .filter(|tx| tx.kind == TxKind::Debit && tx.status != TxStatus::Failed)
        .filter(|debit| debit.status == TxStatus::Pending || !credited.contains(&debit.id))
        .collect()
}

/// Reconciliation engine
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    settlement: Settlement,
    config: ReconcileConfig,
    /// Set before the first pass begins
    started: AtomicBool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ResourceStore>, config: ReconcileConfig) -> Self {
        Self {
            settlement: Settlement::new(store.clone()),
            store,
            config,
            started: AtomicBool::new(false),
        }
    }

    /// Run the pass unless it already ran in this process.
    ///
    /// Returns `None` for every call after the first until [`reset`](Self::reset).
    pub async fn run_once(&self) -> Result<Option<ReconcileReport>, ReconcileError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Reconciliation already ran, skipping");
            return Ok(None);
        }
        self.reconcile().await.map(Some)
    }

    /// Re-arm [`run_once`](Self::run_once)
    pub fn reset(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    pub fn has_run(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// One full pass, ignoring the once guard
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        self.reconcile_at(Utc::now()).await
    }

    /// One full pass with an explicit clock
    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport, ReconcileError> {
        let transactions = self
            .store
            .list_transactions()
            .await
            .map_err(ReconcileError::ListTransactions)?;

        let incomplete = incomplete_debits(&transactions);
        info!(
            store = self.store.name(),
            incomplete = incomplete.len(),
            "Starting reconciliation"
        );

        let mut report = ReconcileReport::default();
        for debit in incomplete {
            match self.repair(debit, &transactions, now).await {
                Ok(action) => {
                    info!(debit_id = %debit.id, action = %action, "Debit reconciled");
                    report.record(debit.id.clone(), action);
                }
                Err(e) => {
                    error!(debit_id = %debit.id, error = %e, "Failed to reconcile debit");
                    report.skip(debit.id.to_string(), e.to_string());
                }
            }
        }

        self.resync_into(&mut report).await?;

        info!(summary = %report, "Reconciliation finished");
        Ok(report)
    }

    /// Finish one debit forward regardless of its age
    pub async fn retry_transfer(&self, debit_id: &TransactionId) -> Result<RepairAction, ReconcileError> {
        let debit = self.store.get_transaction(debit_id).await?;
        if debit.kind != TxKind::Debit {
            return Err(ReconcileError::NotADebit(debit.id));
        }
        if debit.status == TxStatus::Failed {
            info!(debit_id = %debit.id, "Debit already failed, nothing to retry");
            return Ok(RepairAction::SkippedFailed);
        }

        let transactions = self.store.list_transactions().await?;
        let links = TransferLinks::collect(&debit, &transactions);
        let action = match self.settle_linked(&debit, &links).await? {
            Some(action) => action,
            None => self.complete(&debit, &links, Utc::now(), None).await?,
        };
        info!(debit_id = %debit.id, action = %action, "Transfer retried");
        Ok(action)
    }

    async fn repair(
        &self,
        debit: &Transaction,
        transactions: &[Transaction],
        now: DateTime<Utc>,
    ) -> Result<RepairAction, ReconcileError> {
        let links = TransferLinks::collect(debit, transactions);
        if let Some(action) = self.settle_linked(debit, &links).await? {
            return Ok(action);
        }

        let age = now - debit.created_at;
        if age > self.stale_after() {
            self.refund(debit, &links, now).await
        } else {
            let note = format!("Auto-success: Server restart (<{}h)", self.config.stale_after_hours);
            self.complete(debit, &links, now, Some(note.as_str())).await
        }
    }

    /// Catch statuses up when the transfer's outcome is already recorded
    async fn settle_linked(
        &self,
        debit: &Transaction,
        links: &TransferLinks,
    ) -> Result<Option<RepairAction>, ReconcileError> {
        if links.refund.is_some() {
            self.settlement
                .mark_transfer(
                    debit,
                    links.fee.as_ref(),
                    TxStatus::Failed,
                    Some("Transfer failed - see refund"),
                )
                .await?;
            return Ok(Some(RepairAction::AlreadyRefunded));
        }
        if links.completion.is_some() {
            self.settlement
                .mark_transfer(debit, links.fee.as_ref(), TxStatus::Success, None)
                .await?;
            return Ok(Some(RepairAction::AlreadyCompleted));
        }
        Ok(None)
    }

    async fn complete(
        &self,
        debit: &Transaction,
        links: &TransferLinks,
        now: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<RepairAction, ReconcileError> {
        let recipient = debit
            .to_user_id
            .as_ref()
            .ok_or_else(|| ReconcileError::MissingRecipient(debit.id.clone()))?;
        // A missing recipient must fail before the credit exists
        let recipient = self.store.get_user(recipient).await?;

        self.settlement
            .create_completion_credit(
                debit,
                &recipient.id,
                format!("Received from User {}", debit.user_id),
                now,
            )
            .await?;
        self.store
            .update_user_balance(&recipient.id, recipient.balance + debit.amount)
            .await?;
        self.settlement
            .mark_transfer(debit, links.fee.as_ref(), TxStatus::Success, note)
            .await?;
        Ok(RepairAction::Completed)
    }

    async fn refund(
        &self,
        debit: &Transaction,
        links: &TransferLinks,
        now: DateTime<Utc>,
    ) -> Result<RepairAction, ReconcileError> {
        let total = links.total(debit);
        warn!(
            debit_id = %debit.id,
            sender = %debit.user_id,
            total = %total,
            "Stale transfer, refunding sender"
        );
        let sender = self.store.get_user(&debit.user_id).await?;

        self.settlement
            .create_refund(
                debit,
                total,
                format!("Refund: Transfer failed (timeout, linked to {})", debit.id),
                now,
            )
            .await?;
        self.store
            .update_user_balance(&sender.id, sender.balance + total)
            .await?;

        let note = format!("Failed: Timeout (>{}h)", self.config.stale_after_hours);
        self.settlement
            .mark_transfer(debit, links.fee.as_ref(), TxStatus::Failed, Some(note.as_str()))
            .await?;
        Ok(RepairAction::Refunded)
    }

    /// Overwrite every cached balance that differs from its ledger
    async fn resync_into(&self, report: &mut ReconcileReport) -> Result<(), ReconcileError> {
        let users = self
            .store
            .list_users()
            .await
            .map_err(ReconcileError::ListUsers)?;
        let transactions = self
            .store
            .list_transactions()
            .await
            .map_err(ReconcileError::ListTransactions)?;

        for user in &users {
            let check = check_balance(user, &transactions);
            if check.is_consistent {
                continue;
            }

            match self.store.update_user_balance(&user.id, check.derived).await {
                Ok(_) => {
                    info!(
                        user_id = %user.id,
                        stored = %check.stored,
                        derived = %check.derived,
                        "Balance re-synced"
                    );
                    report.resynced.push(Resync {
                        user_id: user.id.clone(),
                        stored: check.stored,
                        derived: check.derived,
                    });
                }
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "Balance re-sync failed");
                    report.skip(user.id.to_string(), format!("balance re-sync failed: {}", e));
                }
            }
        }
        Ok(())
    }

    fn stale_after(&self) -> TimeDelta {
        TimeDelta::from_std(self.config.stale_threshold()).unwrap_or(TimeDelta::MAX)
    }
}
