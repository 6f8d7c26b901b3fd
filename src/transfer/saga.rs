//! Transfer Saga
//!
//! Drives one validated transfer through its six durable writes and, when a
//! write fails after the sender has been charged, compensates.
//!
//! # Steps
//!
//! 1. Re-fetch sender and recipient, re-check `balance >= amount + fee`
//! 2. Create the debit (`pending`)
//! 3. Create the fee (`pending`, linked to the debit)
//! 4. Deduct `amount + fee` from the sender: **point of no return**
//! 5. Create the recipient's credit (`success`), add `amount` to their balance
//! 6. Mark debit and fee `success`
//!
//! # Failure handling
//!
//! | Failed at | Outcome |
//! |-----------|---------|
//! | 1         | Nothing written |
//! | 2, 3, 4   | Created records marked `failed`, balances untouched |
//! | 5         | Credit voided, sender restored, refund credit, records `failed` |
//! | 6         | Money already moved: rolled forward, reconciliation marks statuses |
//!
//! Every write after step 1 is independent. A crash between two of them
//! leaves an intermediate state that only the reconciliation pass repairs.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::TransferError;
use super::settle::Settlement;
use super::state::SagaStep;
use crate::config::WalletConfig;
use crate::core_types::TransactionId;
use crate::models::{NewTransaction, Transaction, TxStatus, User};
use crate::money::fee_for;
use crate::store::{ResourceStore, StoreError};
use crate::validation::TransferOrder;

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub debit_id: TransactionId,
    pub fee_id: TransactionId,
    pub credit_id: TransactionId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub total: Decimal,
    pub sender_balance: Decimal,
    pub recipient_balance: Decimal,
    /// False when the final status writes failed and reconciliation still
    /// has to mark debit and fee `success`
    pub finalized: bool,
}

/// Side effects accumulated so far. Compensation reads this to decide what
/// has to be undone.
#[derive(Debug, Default)]
struct SagaProgress {
    debit: Option<Transaction>,
    fee: Option<Transaction>,
    /// Sender balance before step 4, set once the deduction is written
    balance_deducted: Option<Decimal>,
    recipient_credit: Option<Transaction>,
}

/// A store write that failed mid-saga
#[derive(Debug)]
struct StepFailure {
    step: SagaStep,
    source: StoreError,
}

trait AtStep<T> {
    fn at(self, step: SagaStep) -> Result<T, StepFailure>;
}

impl<T> AtStep<T> for Result<T, StoreError> {
    fn at(self, step: SagaStep) -> Result<T, StepFailure> {
        self.map_err(|source| StepFailure { step, source })
    }
}

/// Executes transfers against a resource store
pub struct TransferSaga {
    store: Arc<dyn ResourceStore>,
    settlement: Settlement,
    config: WalletConfig,
}

impl TransferSaga {
    pub fn new(store: Arc<dyn ResourceStore>, config: WalletConfig) -> Self {
        Self {
            settlement: Settlement::new(store.clone()),
            store,
            config,
        }
    }

    /// Run a validated transfer to a terminal outcome
    pub async fn execute(&self, order: &TransferOrder) -> Result<TransferReceipt, TransferError> {
        let amount = order.amount();
        let fee = fee_for(amount, self.config.fee_percent);
        let total = amount + fee;

        // === Step 1: pre-check (read-only) ===
        let sender = self
            .store
            .get_user(order.sender_id())
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => TransferError::SenderNotFound(order.sender_id().clone()),
                e => TransferError::Aborted {
                    step: SagaStep::PreCheck,
                    source: e,
                },
            })?;

        if sender.balance < total {
            info!(
                sender = %sender.id,
                balance = %sender.balance,
                required = %total,
                "Transfer rejected: insufficient balance"
            );
            return Err(TransferError::InsufficientBalance {
                available: sender.balance,
                required: total,
            });
        }

        let recipient = self
            .store
            .get_user(order.recipient_id())
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => {
                    TransferError::RecipientNotFound(order.recipient_id().clone())
                }
                e => TransferError::Aborted {
                    step: SagaStep::PreCheck,
                    source: e,
                },
            })?;

        info!(
            sender = %sender.id,
            recipient = %recipient.id,
            amount = %amount,
            fee = %fee,
            "Transfer started"
        );

        let mut progress = SagaProgress::default();
        match self
            .run(order, &sender, &recipient, fee, &mut progress)
            .await
        {
            Ok(receipt) => Ok(receipt),
            Err(failure) => Err(self.compensate(progress, failure).await),
        }
    }

    /// Steps 2 to 6
    async fn run(
        &self,
        order: &TransferOrder,
        sender: &User,
        recipient: &User,
        fee: Decimal,
        progress: &mut SagaProgress,
    ) -> Result<TransferReceipt, StepFailure> {
        let amount = order.amount();
        let total = amount + fee;

        // === Step 2: debit ===
        let note = match order.note() {
            Some(note) => note.to_string(),
            None => format!("Transfer to User #{}", recipient.id),
        };
        let debit = self
            .store
            .create_transaction(&NewTransaction::debit(
                &sender.id,
                &recipient.id,
                amount,
                note,
                Utc::now(),
            ))
            .await
            .at(SagaStep::CreateDebit)?;
        info!(debit_id = %debit.id, "Debit created");
        progress.debit = Some(debit.clone());

        // === Step 3: fee ===
        let fee_tx = self
            .store
            .create_transaction(&NewTransaction::fee(&debit, fee, Utc::now()))
            .await
            .at(SagaStep::CreateFee)?;
        progress.fee = Some(fee_tx.clone());

        // === Step 4: deduct sender (point of no return) ===
        let sender_after = self
            .store
            .update_user_balance(&sender.id, sender.balance - total)
            .await
            .at(SagaStep::DeductSender)?;
        progress.balance_deducted = Some(sender.balance);
        info!(
            debit_id = %debit.id,
            sender = %sender.id,
            balance = %sender_after.balance,
            "Sender charged"
        );

        // === Step 5: credit recipient ===
        let recipient_now = self
            .store
            .get_user(&recipient.id)
            .await
            .at(SagaStep::CreditRecipient)?;
        let credit = self
            .settlement
            .create_completion_credit(
                &debit,
                &recipient.id,
                format!("Received from {}", sender.display_name()),
                Utc::now(),
            )
            .await
            .at(SagaStep::CreditRecipient)?;
        progress.recipient_credit = Some(credit.clone());
        let recipient_after = self
            .store
            .update_user_balance(&recipient.id, recipient_now.balance + amount)
            .await
            .at(SagaStep::CreditRecipient)?;

        // === Step 6: mark success ===
        let finalized = match self
            .settlement
            .mark_transfer(&debit, Some(&fee_tx), TxStatus::Success, None)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    debit_id = %debit.id,
                    step = %SagaStep::MarkSuccess,
                    error = %e,
                    "Transfer completed but status update failed, left for reconciliation"
                );
                false
            }
        };

        info!(
            debit_id = %debit.id,
            credit_id = %credit.id,
            finalized,
            "Transfer completed"
        );

        Ok(TransferReceipt {
            debit_id: debit.id,
            fee_id: fee_tx.id,
            credit_id: credit.id,
            amount,
            fee,
            total,
            sender_balance: sender_after.balance,
            recipient_balance: recipient_after.balance,
            finalized,
        })
    }

    /// Undo what `progress` shows was done and build the error to surface
    async fn compensate(&self, progress: SagaProgress, failure: StepFailure) -> TransferError {
        let StepFailure { step, source } = failure;

        let Some(debit) = progress.debit else {
            warn!(step = %step, error = %source, "Transfer aborted before any write");
            return TransferError::Aborted { step, source };
        };

        let Some(original_balance) = progress.balance_deducted else {
            warn!(
                debit_id = %debit.id,
                step = %step,
                error = %source,
                "Transfer aborted, sender was not charged"
            );
            self.mark_failed_best_effort(&debit, progress.fee.as_ref(), "Transfer failed")
                .await;
            return TransferError::Aborted { step, source };
        };

        warn!(
            debit_id = %debit.id,
            step = %step,
            error = %source,
            "Transfer failed after charging sender, compensating"
        );

        let cause = Box::new(TransferError::Store(source));
        let fatal = |refund_error: StoreError| {
            error!(
                debit_id = %debit.id,
                error = %refund_error,
                "CRITICAL: Compensation failed, ledger left for reconciliation"
            );
            TransferError::CompensationFailed {
                debit_id: debit.id.clone(),
                step,
                cause: cause.clone(),
                refund_error,
            }
        };

        // A recorded credit must be voided before the refund exists
        if let Some(credit) = &progress.recipient_credit
            && let Err(e) = self
                .settlement
                .mark_status(credit, TxStatus::Failed, Some("Voided: transfer refunded"))
                .await
        {
            return fatal(e);
        }

        if let Err(e) = self
            .store
            .update_user_balance(&debit.user_id, original_balance)
            .await
        {
            return fatal(e);
        }

        let total = debit.amount + progress.fee.as_ref().map_or(Decimal::ZERO, |f| f.amount);
        if let Err(e) = self
            .settlement
            .create_refund(
                &debit,
                total,
                format!("Refund: Transfer failed (linked to {})", debit.id),
                Utc::now(),
            )
            .await
        {
            return fatal(e);
        }

        self.mark_failed_best_effort(&debit, progress.fee.as_ref(), "Transfer failed - see refund")
            .await;

        info!(debit_id = %debit.id, refunded = %total, "Sender refunded");
        TransferError::Refunded {
            debit_id: debit.id.clone(),
            step,
            cause,
        }
    }

    async fn mark_failed_best_effort(&self, debit: &Transaction, fee: Option<&Transaction>, note: &str) {
        if let Err(e) = self
            .settlement
            .mark_transfer(debit, fee, TxStatus::Failed, Some(note))
            .await
        {
            warn!(
                debit_id = %debit.id,
                error = %e,
                "Could not mark transfer failed, left for reconciliation"
            );
        }
    }
}
