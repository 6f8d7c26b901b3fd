//! Saga step definitions
//!
//! A transfer has no record of its own: its state is the status of the
//! debit that began it. Steps name where a saga stopped.

use std::fmt;

/// Saga steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SagaStep {
    /// Re-fetch sender and recipient, re-check balance (read-only)
    PreCheck = 1,
    CreateDebit = 2,
    CreateFee = 3,
    /// Point of no return once it succeeds
    DeductSender = 4,
    CreditRecipient = 5,
    MarkSuccess = 6,
}

impl SagaStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::PreCheck => "PRE_CHECK",
            SagaStep::CreateDebit => "CREATE_DEBIT",
            SagaStep::CreateFee => "CREATE_FEE",
            SagaStep::DeductSender => "DEDUCT_SENDER",
            SagaStep::CreditRecipient => "CREDIT_RECIPIENT",
            SagaStep::MarkSuccess => "MARK_SUCCESS",
        }
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
