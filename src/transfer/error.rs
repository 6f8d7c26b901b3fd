//! Transfer Error Types

use rust_decimal::Decimal;
use thiserror::Error;

use super::state::SagaStep;
use crate::core_types::{TransactionId, UserId};
use crate::money::format_amount;
use crate::store::StoreError;
use crate::validation::{PreflightError, ValidationErrors};

/// Transfer error types
///
/// Variants are ordered by how far the saga got. Everything up to `Aborted`
/// left balances untouched; `Refunded` and `CompensationFailed` happened
/// after the point of no return.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Pre-flight (no writes) ===
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error(
        "Insufficient balance. You have {}, need {} (incl. fee).",
        format_amount(.available),
        format_amount(.required)
    )]
    InsufficientBalance { available: Decimal, required: Decimal },

    #[error("Sender not found: {0}")]
    SenderNotFound(UserId),

    #[error("Recipient not found. Please verify the User ID and try again.")]
    RecipientNotFound(UserId),

    // === Saga failures ===
    #[error("Transfer failed at {step}. Your balance was not reduced. ({source})")]
    Aborted {
        step: SagaStep,
        #[source]
        source: StoreError,
    },

    #[error("Transfer failed after debit. Your balance has been refunded. ({cause})")]
    Refunded {
        debit_id: TransactionId,
        step: SagaStep,
        cause: Box<TransferError>,
    },

    #[error(
        "Transfer failed and refund encountered an issue. Please contact support. \
         (debit {debit_id}: {refund_error})"
    )]
    CompensationFailed {
        debit_id: TransactionId,
        step: SagaStep,
        cause: Box<TransferError>,
        refund_error: StoreError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "VALIDATION_FAILED",
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::SenderNotFound(_) => "SENDER_NOT_FOUND",
            TransferError::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            TransferError::Aborted { .. } => "TRANSFER_ABORTED",
            TransferError::Refunded { .. } => "TRANSFER_REFUNDED",
            TransferError::CompensationFailed { .. } => "COMPENSATION_FAILED",
            TransferError::Store(_) => "STORE_ERROR",
        }
    }

    /// True when the user may fix the input and retry
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            TransferError::Validation(_)
                | TransferError::InsufficientBalance { .. }
                | TransferError::RecipientNotFound(_)
        )
    }

    /// True when the ledger may be inconsistent until reconciliation runs
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, TransferError::CompensationFailed { .. })
    }

    /// Debit the error refers to, once one exists
    pub fn debit_id(&self) -> Option<&TransactionId> {
        match self {
            TransferError::Refunded { debit_id, .. }
            | TransferError::CompensationFailed { debit_id, .. } => Some(debit_id),
            _ => None,
        }
    }
}

impl From<PreflightError> for TransferError {
    fn from(e: PreflightError) -> Self {
        match e {
            PreflightError::Rejected(errors) => TransferError::Validation(errors),
            PreflightError::Store(source) => TransferError::Store(source),
        }
    }
}
