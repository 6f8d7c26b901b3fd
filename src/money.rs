//! Money Module
//!
//! All amounts and balances are exact decimals. Conversions from client
//! input and fee arithmetic MUST go through this module.
//!
//! ## Usage
//! ```rust
//! use mini_wallet::money::{fee_for, parse_amount};
//! use rust_decimal::Decimal;
//!
//! let amount = parse_amount("500").unwrap();
//! let fee = fee_for(amount, Decimal::new(2, 2)); // 2%
//! assert_eq!(fee, Decimal::from(10));
//! ```

use rust_decimal::prelude::*;
use std::borrow::Borrow;
use thiserror::Error;

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MoneyError {
    #[error("Amount is required")]
    Missing,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Parse a client-provided amount string.
///
/// Only emptiness and numeric format are checked here; sign and limits are
/// business rules owned by validation.
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::Missing);
    }

    Decimal::from_str(amount_str)
        .or_else(|_| Decimal::from_scientific(amount_str))
        .map_err(|_| MoneyError::InvalidFormat(amount_str.to_string()))
}

/// Fee charged on a transfer: `amount * fee_percent`, kept exact.
#[inline]
pub fn fee_for(amount: Decimal, fee_percent: Decimal) -> Decimal {
    (amount * fee_percent).normalize()
}

/// Display an amount with two decimal places, e.g. `4490.00`.
pub fn format_amount(amount: impl Borrow<Decimal>) -> String {
    format!("{:.2}", amount.borrow().round_dp(2))
}
