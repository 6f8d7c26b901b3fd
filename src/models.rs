//! Ledger records: users and transactions as stored in the resource store.
//!
//! Field names follow the store's camelCase JSON. Amounts are exact
//! decimals serialized as JSON numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{TransactionId, UserId};

// ============================================================
// USER
// ============================================================

/// Wallet holder. `balance` is a denormalized cache of the derived balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

impl User {
    /// Name for notes and messages, falling back to the id
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("User #{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// `PATCH /users/{id}` body. Only the balance is ever written.
#[derive(Debug, Clone, Serialize)]
pub struct BalancePatch {
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

// ============================================================
// TRANSACTION KIND / STATUS
// ============================================================

/// Transaction type (`type` on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Credit,
    Debit,
    Fee,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Credit => "credit",
            TxKind::Debit => "debit",
            TxKind::Fee => "fee",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction status
///
/// `Pending` and `Success` count towards the balance; `Failed` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    #[inline]
    pub fn counts_toward_balance(&self) -> bool {
        matches!(self, TxStatus::Pending | TxStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TxStatus::Pending),
            "success" => Ok(TxStatus::Success),
            "failed" => Ok(TxStatus::Failed),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

// ============================================================
// TRANSACTION
// ============================================================

/// Immutable ledger entry.
///
/// Only `status`, `note` and `deleted`/`deleted_at` change after creation,
/// and only through [`TransactionPatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TxKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
    pub status: TxStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }

    /// True if this entry is linked to the given debit
    #[inline]
    pub fn is_linked_to(&self, debit_id: &TransactionId) -> bool {
        self.linked_transaction_id.as_ref() == Some(debit_id)
    }

    /// Signed effect on the owner's balance, ignoring status and deletion
    #[inline]
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TxKind::Credit => self.amount,
            TxKind::Debit | TxKind::Fee => -self.amount,
        }
    }
}

/// `POST /transactions` body: a transaction without its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    #[serde(rename = "type")]
    pub kind: TxKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    /// Sender side of a transfer, created pending
    pub fn debit(
        sender: &UserId,
        recipient: &UserId,
        amount: Decimal,
        note: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TxKind::Debit,
            amount,
            user_id: sender.clone(),
            to_user_id: Some(recipient.clone()),
            from_user_id: None,
            status: TxStatus::Pending,
            note: Some(note),
            linked_transaction_id: None,
            created_at: now,
        }
    }

    /// Transfer fee, created pending and linked to its debit
    pub fn fee(debit: &Transaction, amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            kind: TxKind::Fee,
            amount,
            user_id: debit.user_id.clone(),
            to_user_id: None,
            from_user_id: None,
            status: TxStatus::Pending,
            note: Some("Transfer fee".to_string()),
            linked_transaction_id: Some(debit.id.clone()),
            created_at: now,
        }
    }

    /// Recipient side of a transfer (the completion credit)
    pub fn completion_credit(
        debit: &Transaction,
        recipient: &UserId,
        note: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TxKind::Credit,
            amount: debit.amount,
            user_id: recipient.clone(),
            to_user_id: None,
            from_user_id: Some(debit.user_id.clone()),
            status: TxStatus::Success,
            note: Some(note),
            linked_transaction_id: Some(debit.id.clone()),
            created_at: now,
        }
    }

    /// Money returned to the sender of a failed transfer
    pub fn refund_credit(
        debit: &Transaction,
        total: Decimal,
        note: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TxKind::Credit,
            amount: total,
            user_id: debit.user_id.clone(),
            to_user_id: None,
            from_user_id: None,
            status: TxStatus::Success,
            note: Some(note),
            linked_transaction_id: Some(debit.id.clone()),
            created_at: now,
        }
    }

    /// Top-up credit
    pub fn top_up(user: &UserId, amount: Decimal, note: String, now: DateTime<Utc>) -> Self {
        Self {
            kind: TxKind::Credit,
            amount,
            user_id: user.clone(),
            to_user_id: None,
            from_user_id: None,
            status: TxStatus::Success,
            note: Some(note),
            linked_transaction_id: None,
            created_at: now,
        }
    }

    /// Materialize with a store-assigned id
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            kind: self.kind,
            amount: self.amount,
            user_id: self.user_id,
            to_user_id: self.to_user_id,
            from_user_id: self.from_user_id,
            status: self.status,
            note: self.note,
            linked_transaction_id: self.linked_transaction_id,
            created_at: self.created_at,
            deleted: None,
            deleted_at: None,
        }
    }
}

/// `PATCH /transactions/{id}` body: any subset of the mutable fields.
///
/// `deleted_at: Some(None)` serializes as an explicit `null` (restore).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TxStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

impl TransactionPatch {
    pub fn status(status: TxStatus, note: Option<String>) -> Self {
        Self {
            status: Some(status),
            note,
            ..Default::default()
        }
    }

    pub fn soft_delete(now: DateTime<Utc>) -> Self {
        Self {
            deleted: Some(true),
            deleted_at: Some(Some(now)),
            ..Default::default()
        }
    }

    pub fn restore() -> Self {
        Self {
            deleted: Some(false),
            deleted_at: Some(None),
            ..Default::default()
        }
    }

    /// Apply to a stored record (used by in-memory stores)
    pub fn apply(&self, tx: &mut Transaction) {
        if let Some(status) = self.status {
            tx.status = status;
        }
        if let Some(note) = &self.note {
            tx.note = Some(note.clone());
        }
        if let Some(deleted) = self.deleted {
            tx.deleted = Some(deleted);
        }
        if let Some(deleted_at) = self.deleted_at {
            tx.deleted_at = deleted_at;
        }
    }
}
