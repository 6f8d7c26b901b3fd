//! Wallet operations
//!
//! The user-facing surface over a resource store: transfers (through the
//! validation gate and the saga), top-ups, balance checks, soft delete and
//! undo, and history.

pub mod history;

pub use history::{DEFAULT_PAGE_SIZE, HistoryPage, HistoryQuery, history_page};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::balance::{BalanceCheck, check_balance};
use crate::config::WalletConfig;
use crate::core_types::{TransactionId, UserId};
use crate::models::{NewTransaction, Transaction};
use crate::store::{ResourceStore, StoreError};
use crate::transfer::{TransferError, TransferReceipt, TransferSaga};
use crate::validation::{TransferInput, ValidationErrors, ValidationGate};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl WalletError {
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::Validation(_) => "VALIDATION_FAILED",
            WalletError::UserNotFound(_) => "USER_NOT_FOUND",
            WalletError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            WalletError::Store(_) => "STORE_ERROR",
        }
    }

    fn user(id: &UserId, e: StoreError) -> Self {
        if e.is_not_found() {
            WalletError::UserNotFound(id.clone())
        } else {
            WalletError::Store(e)
        }
    }

    fn transaction(id: &TransactionId, e: StoreError) -> Self {
        if e.is_not_found() {
            WalletError::TransactionNotFound(id.clone())
        } else {
            WalletError::Store(e)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopUpReceipt {
    pub transaction: Transaction,
    pub balance: Decimal,
}

pub struct Wallet {
    store: Arc<dyn ResourceStore>,
    gate: ValidationGate,
    saga: TransferSaga,
}

impl Wallet {
    pub fn new(store: Arc<dyn ResourceStore>, config: WalletConfig) -> Self {
        Self {
            saga: TransferSaga::new(store.clone(), config.clone()),
            gate: ValidationGate::new(config),
            store,
        }
    }

    /// Validate against the live balance and the user directory, then run
    /// the saga
    pub async fn transfer(&self, input: &TransferInput) -> Result<TransferReceipt, TransferError> {
        let users = self.store.list_users().await?;
        let order = self
            .gate
            .validate(self.store.as_ref(), input, Some(users.as_slice()))
            .await?;
        self.saga.execute(&order).await
    }

    /// Credit `amount` to the user: record first, then the cached balance
    pub async fn top_up(
        &self,
        user_id: &UserId,
        amount: &str,
        note: Option<&str>,
    ) -> Result<TopUpReceipt, WalletError> {
        let amount = self
            .gate
            .check_top_up(amount, note)
            .map_err(WalletError::Validation)?;
        let user = self
            .store
            .get_user(user_id)
            .await
            .map_err(|e| WalletError::user(user_id, e))?;

        let note = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Top-up")
            .to_string();
        let transaction = self
            .store
            .create_transaction(&NewTransaction::top_up(&user.id, amount, note, Utc::now()))
            .await?;
        let updated = self
            .store
            .update_user_balance(&user.id, user.balance + amount)
            .await?;

        info!(user_id = %user.id, amount = %amount, balance = %updated.balance, "Top-up completed");
        Ok(TopUpReceipt {
            transaction,
            balance: updated.balance,
        })
    }

    /// Cached balance against the ledger
    pub async fn check_balance(&self, user_id: &UserId) -> Result<BalanceCheck, WalletError> {
        let user = self
            .store
            .get_user(user_id)
            .await
            .map_err(|e| WalletError::user(user_id, e))?;
        let transactions = self.store.transactions_for_user(user_id).await?;
        Ok(check_balance(&user, &transactions))
    }

    /// Soft delete: the entry stays in the store but leaves derivation
    pub async fn delete_transaction(&self, id: &TransactionId) -> Result<Transaction, WalletError> {
        let tx = self
            .store
            .soft_delete_transaction(id)
            .await
            .map_err(|e| WalletError::transaction(id, e))?;
        info!(tx_id = %id, "Transaction deleted");
        Ok(tx)
    }

    /// Undo a soft delete. No new record is written.
    pub async fn restore_transaction(&self, id: &TransactionId) -> Result<Transaction, WalletError> {
        let tx = self
            .store
            .restore_transaction(id)
            .await
            .map_err(|e| WalletError::transaction(id, e))?;
        info!(tx_id = %id, "Transaction restored");
        Ok(tx)
    }

    pub async fn history(
        &self,
        user_id: &UserId,
        query: &HistoryQuery,
    ) -> Result<HistoryPage, WalletError> {
        let transactions = self.store.transactions_for_user(user_id).await?;
        Ok(history_page(&transactions, user_id, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::store::{MemoryStore, StoreOp};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<MemoryStore>, Wallet) {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(User {
            id: "1".into(),
            name: "Alice".into(),
            balance: Decimal::ZERO,
        });
        let wallet = Wallet::new(store.clone(), WalletConfig::default());
        (store, wallet)
    }

    #[tokio::test]
    async fn test_top_up() {
        let (store, wallet) = setup();

        let receipt = wallet.top_up(&"1".into(), "250.50", None).await.unwrap();
        assert_eq!(receipt.balance, dec!(250.50));
        assert_eq!(receipt.transaction.note.as_deref(), Some("Top-up"));
        assert!(wallet.check_balance(&"1".into()).await.unwrap().is_consistent);
        assert_eq!(store.mutation_count(), 2);
    }

    #[tokio::test]
    async fn test_top_up_limits() {
        let (store, wallet) = setup();

        let err = wallet.top_up(&"1".into(), "60000", None).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        let err = wallet.top_up(&"1".into(), "0", None).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert_eq!(store.mutation_count(), 0);

        let err = wallet.top_up(&"9".into(), "10", None).await.unwrap_err();
        assert_eq!(err, WalletError::UserNotFound("9".into()));
    }

    #[tokio::test]
    async fn test_interrupted_top_up_shows_drift() {
        let (store, wallet) = setup();
        store.fail_nth(StoreOp::UpdateUserBalance, 1);

        assert!(wallet.top_up(&"1".into(), "100", Some("salary")).await.is_err());
        let check = wallet.check_balance(&"1".into()).await.unwrap();
        assert!(!check.is_consistent);
        assert_eq!(check.drift(), dec!(100));
    }

    #[tokio::test]
    async fn test_delete_and_restore() {
        let (_store, wallet) = setup();
        let receipt = wallet.top_up(&"1".into(), "100", None).await.unwrap();
        let id = receipt.transaction.id;

        let deleted = wallet.delete_transaction(&id).await.unwrap();
        assert!(deleted.is_deleted());
        assert_eq!(wallet.check_balance(&"1".into()).await.unwrap().derived, dec!(0));
        assert_eq!(
            wallet.history(&"1".into(), &HistoryQuery::default()).await.unwrap().total_items,
            0
        );

        wallet.restore_transaction(&id).await.unwrap();
        assert_eq!(wallet.check_balance(&"1".into()).await.unwrap().derived, dec!(100));

        let err = wallet.delete_transaction(&"nope".into()).await.unwrap_err();
        assert_eq!(err.code(), "TRANSACTION_NOT_FOUND");
    }
}
