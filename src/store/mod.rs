//! Resource Store
//!
//! The ledger lives in a plain resource store with two collections,
//! `users` and `transactions`. The store offers get/list/create/patch only:
//! no cross-record transactions and no server-side filtering, so every
//! query filters client-side and every multi-record change is a sequence of
//! independent writes.
//!
//! - [`http::HttpStore`]: REST client (`GET/POST/PATCH` over JSON)
//! - [`memory::MemoryStore`]: in-process store with fault injection

pub mod http;
pub mod memory;

pub use http::HttpStore;
pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::{TransactionId, UserId};
use crate::models::{NewTransaction, Transaction, TransactionPatch, TxStatus, User};

/// Store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("Store request failed: {0}")]
    Transport(String),

    #[error("Store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed store response: {0}")]
    Decode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "NOT_FOUND",
            StoreError::Transport(_) => "TRANSPORT",
            StoreError::Status { .. } => "HTTP_STATUS",
            StoreError::Decode(_) => "DECODE",
            StoreError::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

/// Resource store contract
///
/// Implementations must be safe to share across tasks. None of the methods
/// are atomic with each other.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// `GET /users`
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// `GET /users/{id}`
    async fn get_user(&self, id: &UserId) -> Result<User, StoreError>;

    /// `PATCH /users/{id}` with `{balance}`
    async fn update_user_balance(&self, id: &UserId, balance: Decimal)
    -> Result<User, StoreError>;

    /// `GET /transactions`, soft-deleted entries included
    async fn list_transactions(&self) -> Result<Vec<Transaction>, StoreError>;

    /// `GET /transactions/{id}`
    async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError>;

    /// `POST /transactions`; the store assigns the id
    async fn create_transaction(&self, tx: &NewTransaction) -> Result<Transaction, StoreError>;

    /// `PATCH /transactions/{id}` with any subset of the mutable fields
    async fn patch_transaction(
        &self,
        id: &TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction, StoreError>;

    // === Derived operations ===

    /// Transactions owned by `user_id` that are not soft-deleted.
    ///
    /// Fees are included; hiding them is a presentation concern.
    async fn transactions_for_user(&self, user_id: &UserId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .list_transactions()
            .await?
            .into_iter()
            .filter(|tx| !tx.is_deleted() && &tx.user_id == user_id)
            .collect())
    }

    async fn update_transaction_status(
        &self,
        id: &TransactionId,
        status: TxStatus,
        note: Option<String>,
    ) -> Result<Transaction, StoreError> {
        self.patch_transaction(id, &TransactionPatch::status(status, note))
            .await
    }

    /// Soft delete: `{deleted: true, deletedAt: now}`
    async fn soft_delete_transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
        self.patch_transaction(id, &TransactionPatch::soft_delete(Utc::now()))
            .await
    }

    /// Undo a soft delete: `{deleted: false, deletedAt: null}`
    async fn restore_transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
        self.patch_transaction(id, &TransactionPatch::restore())
            .await
    }
}
