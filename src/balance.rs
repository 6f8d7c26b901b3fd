//! Balance derivation: the ledger is the source of truth.
//!
//! `User.balance` is only a cache. Everything that needs to know how much a
//! user owns folds their transaction log with [`derive_balance`] and, where
//! the cache matters, compares the result against it with [`check_balance`].
//!
//! # Fold rules
//!
//! - Soft-deleted entries are skipped.
//! - Only `pending` and `success` entries count; `failed` never does.
//! - Credits add; debits and fees subtract.
//! - A refund credit whose debit is in the same log and already `failed`
//!   is skipped: the failed debit and fee are no longer subtracted, so
//!   adding the refund too would return the money twice.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

use crate::core_types::{TransactionId, UserId};
use crate::models::{Transaction, TxKind, TxStatus, User};

/// Fold a user's transaction log into a balance. Pure, no I/O.
pub fn derive_balance<'a, I>(transactions: I) -> Decimal
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let transactions: Vec<&Transaction> = transactions.into_iter().collect();

    // Debits already excluded as failed, keyed with their owner
    let failed_debits: HashSet<(TransactionId, UserId)> = transactions
        .iter()
        .filter(|tx| tx.kind == TxKind::Debit && tx.status == TxStatus::Failed)
        .map(|tx| (tx.id.clone(), tx.user_id.clone()))
        .collect();

    transactions
        .iter()
        .filter(|tx| !tx.is_deleted())
        .filter(|tx| tx.status.counts_toward_balance())
        .filter(|tx| !offsets_failed_debit(tx, &failed_debits))
        .fold(Decimal::ZERO, |acc, tx| acc + tx.signed_amount())
}

fn offsets_failed_debit(tx: &Transaction, failed_debits: &HashSet<(TransactionId, UserId)>) -> bool {
    tx.kind == TxKind::Credit
        && tx.linked_transaction_id.as_ref().is_some_and(|debit_id| {
            failed_debits.contains(&(debit_id.clone(), tx.user_id.clone()))
        })
}

/// Stored-vs-derived comparison for one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceCheck {
    pub user_id: UserId,
    pub stored: Decimal,
    pub derived: Decimal,
    pub is_consistent: bool,
}

impl BalanceCheck {
    /// Amount the cache must move by to match the ledger
    pub fn drift(&self) -> Decimal {
        self.derived - self.stored
    }
}

/// Compare a user's cached balance against their ledger.
///
/// `transactions` may contain other users' entries; only the user's own
/// entries are folded.
pub fn check_balance<'a, I>(user: &User, transactions: I) -> BalanceCheck
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let derived = derive_balance(
        transactions
            .into_iter()
            .filter(|tx| tx.user_id == user.id),
    );

    BalanceCheck {
        user_id: user.id.clone(),
        stored: user.balance,
        derived,
        is_consistent: user.balance == derived,
    }
}
