//! Settlement primitives
//!
//! The individual writes that move a transfer toward a terminal state.
//! Both the saga and reconciliation finish debits through here, so the
//! records they create look the same whichever path wrote them.
//!
//! Status writes are idempotent: a record already in the target status is
//! not patched again.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::core_types::UserId;
use crate::models::{NewTransaction, Transaction, TxKind, TxStatus};
use crate::store::{ResourceStore, StoreError};

/// Records linked to one debit, found by scanning the log client-side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferLinks {
    pub fee: Option<Transaction>,
    /// Credit to someone other than the sender that has not been voided
    pub completion: Option<Transaction>,
    /// Credit back to the sender
    pub refund: Option<Transaction>,
}

impl TransferLinks {
    pub fn collect<'a, I>(debit: &Transaction, transactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut links = TransferLinks::default();
        for tx in transactions {
            if !tx.is_linked_to(&debit.id) {
                continue;
            }
            match tx.kind {
                TxKind::Fee if links.fee.is_none() => links.fee = Some(tx.clone()),
                TxKind::Credit if tx.user_id == debit.user_id => {
                    if links.refund.is_none() {
                        links.refund = Some(tx.clone());
                    }
                }
                TxKind::Credit if tx.status != TxStatus::Failed => {
                    if links.completion.is_none() {
                        links.completion = Some(tx.clone());
                    }
                }
                _ => {}
            }
        }
        links
    }

    pub fn fee_amount(&self) -> Decimal {
        self.fee.as_ref().map_or(Decimal::ZERO, |fee| fee.amount)
    }

    /// What the sender paid for `debit`: amount plus its fee
    pub fn total(&self, debit: &Transaction) -> Decimal {
        debit.amount + self.fee_amount()
    }
}

/// Store writes used to settle a transfer
#[derive(Clone)]
pub struct Settlement {
    store: Arc<dyn ResourceStore>,
}

impl Settlement {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Record the recipient's side of `debit`
    pub async fn create_completion_credit(
        &self,
        debit: &Transaction,
        recipient: &UserId,
        note: String,
        now: DateTime<Utc>,
    ) -> Result<Transaction, StoreError> {
        let credit = self
            .store
            .create_transaction(&NewTransaction::completion_credit(debit, recipient, note, now))
            .await?;
        debug!(
            debit_id = %debit.id,
            credit_id = %credit.id,
            recipient = %recipient,
            amount = %credit.amount,
            "Completion credit created"
        );
        Ok(credit)
    }

    /// Return `total` to the sender of `debit`
    pub async fn create_refund(
        &self,
        debit: &Transaction,
        total: Decimal,
        note: String,
        now: DateTime<Utc>,
    ) -> Result<Transaction, StoreError> {
        let refund = self
            .store
            .create_transaction(&NewTransaction::refund_credit(debit, total, note, now))
            .await?;
        debug!(
            debit_id = %debit.id,
            refund_id = %refund.id,
            amount = %total,
            "Refund credit created"
        );
        Ok(refund)
    }

    /// Set `tx` to `status`. Returns false when it already was.
    pub async fn mark_status(
        &self,
        tx: &Transaction,
        status: TxStatus,
        note: Option<&str>,
    ) -> Result<bool, StoreError> {
        if tx.status == status {
            return Ok(false);
        }
        self.store
            .update_transaction_status(&tx.id, status, note.map(str::to_string))
            .await?;
        debug!(tx_id = %tx.id, kind = tx.kind.as_str(), status = status.as_str(), "Status updated");
        Ok(true)
    }

    /// Set a debit and its fee to `status`. Returns the number of records
    /// actually patched.
    ///
    /// Success writes run concurrently. Failure writes go fee first: a debit
    /// left `pending` is still picked up by reconciliation, a `failed` one
    /// is not.
    pub async fn mark_transfer(
        &self,
        debit: &Transaction,
        fee: Option<&Transaction>,
        status: TxStatus,
        note: Option<&str>,
    ) -> Result<usize, StoreError> {
        let mark_fee = async {
            match fee {
                Some(fee) => self.mark_status(fee, status, note).await,
                None => Ok(false),
            }
        };

        if status == TxStatus::Failed {
            let fee_written = mark_fee.await?;
            let debit_written = self.mark_status(debit, status, note).await?;
            return Ok(usize::from(debit_written) + usize::from(fee_written));
        }

        let (debit_written, fee_written) =
            tokio::join!(self.mark_status(debit, status, note), mark_fee);
        Ok(usize::from(debit_written?) + usize::from(fee_written?))
    }
}
