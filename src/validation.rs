//! Pre-flight validation for transfers and top-ups
//!
//! Every rule runs independently and all violations are collected, so the
//! user sees every problem at once. A successful check yields a typed
//! [`TransferOrder`], the only input the transfer saga accepts.

use rust_decimal::Decimal;
use std::fmt;

use crate::config::WalletConfig;
use crate::core_types::UserId;
use crate::money::{self, MoneyError, fee_for, format_amount};
use crate::models::User;
use crate::store::{ResourceStore, StoreError};

// ============================================================================
// Validation Errors
// ============================================================================

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Amount is required")]
    AmountRequired,

    #[error("Amount must be a number")]
    AmountNotNumeric,

    #[error("Amount must be greater than 0")]
    AmountNotPositive,

    #[error("Amount exceeds maximum limit of {}", format_amount(.limit))]
    AmountExceedsLimit { limit: Decimal },

    #[error("Amount exceeds maximum top-up limit of {}", format_amount(.limit))]
    TopUpExceedsLimit { limit: Decimal },

    #[error("Please select a recipient")]
    RecipientRequired,

    #[error("Cannot transfer money to yourself")]
    SelfTransfer,

    #[error("Selected recipient does not exist")]
    RecipientNotFound,

    #[error("Note cannot exceed {max} characters")]
    NoteTooLong { max: usize },

    #[error(
        "Insufficient balance. You have {}, but need {} (including {} fee)",
        format_amount(.available),
        format_amount(.required),
        format_amount(.fee)
    )]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
        fee: Decimal,
    },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::AmountRequired => "AMOUNT_REQUIRED",
            ValidationError::AmountNotNumeric => "AMOUNT_NOT_NUMERIC",
            ValidationError::AmountNotPositive => "INVALID_AMOUNT",
            ValidationError::AmountExceedsLimit { .. } => "AMOUNT_TOO_LARGE",
            ValidationError::TopUpExceedsLimit { .. } => "TOP_UP_TOO_LARGE",
            ValidationError::RecipientRequired => "RECIPIENT_REQUIRED",
            ValidationError::SelfTransfer => "SAME_ACCOUNT",
            ValidationError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            ValidationError::NoteTooLong { .. } => "NOTE_TOO_LONG",
            ValidationError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
        }
    }
}

/// All violations found by one validation run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains(&self, predicate: impl Fn(&ValidationError) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join(". "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Why a pre-flight check did not produce an order
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum PreflightError {
    #[error("{0}")]
    Rejected(ValidationErrors),

    #[error("Could not verify balance: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// Inputs / Outputs
// ============================================================================

/// Raw transfer form as entered by the sender
#[derive(Debug, Clone)]
pub struct TransferInput {
    pub sender_id: UserId,
    pub recipient_id: Option<UserId>,
    pub amount: String,
    pub note: Option<String>,
}

/// A validated transfer. Fields are private so the saga can only be fed
/// through validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOrder {
    sender_id: UserId,
    recipient_id: UserId,
    amount: Decimal,
    note: Option<String>,
}

impl TransferOrder {
    pub fn sender_id(&self) -> &UserId {
        &self.sender_id
    }

    pub fn recipient_id(&self) -> &UserId {
        &self.recipient_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Transfer/top-up rule checks against a [`WalletConfig`]
#[derive(Debug, Clone)]
pub struct ValidationGate {
    config: WalletConfig,
}

impl ValidationGate {
    pub fn new(config: WalletConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Pure rule check.
    ///
    /// `known_users`: when a non-empty directory is supplied the recipient
    /// must be in it. `live_balance`: the sender's freshly fetched balance;
    /// sufficiency is only checked when it is known and the amount parsed.
    pub fn check(
        &self,
        input: &TransferInput,
        known_users: Option<&[User]>,
        live_balance: Option<Decimal>,
    ) -> Result<TransferOrder, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let amount = self.check_transfer_amount(&input.amount, &mut errors);
        let recipient = check_recipient(
            input.recipient_id.as_ref(),
            &input.sender_id,
            known_users,
            &mut errors,
        );
        self.check_note(input.note.as_deref(), &mut errors);

        if let (Some(amount), Some(available)) = (amount, live_balance) {
            let fee = fee_for(amount, self.config.fee_percent);
            let required = amount + fee;
            if available < required {
                errors.push(ValidationError::InsufficientBalance {
                    available,
                    required,
                    fee,
                });
            }
        }

        match (amount, recipient) {
            (Some(amount), Some(recipient_id)) if errors.is_empty() => Ok(TransferOrder {
                sender_id: input.sender_id.clone(),
                recipient_id,
                amount,
                note: normalize_note(input.note.as_deref()),
            }),
            _ => Err(errors),
        }
    }

    /// Full pre-flight: fetches the sender's live balance from the store,
    /// then runs every rule.
    pub async fn validate(
        &self,
        store: &dyn ResourceStore,
        input: &TransferInput,
        known_users: Option<&[User]>,
    ) -> Result<TransferOrder, PreflightError> {
        let sender = store.get_user(&input.sender_id).await?;
        self.check(input, known_users, Some(sender.balance))
            .map_err(PreflightError::Rejected)
    }

    /// Top-up rules: positive, within both the top-up and transfer limits,
    /// note length.
    pub fn check_top_up(
        &self,
        amount: &str,
        note: Option<&str>,
    ) -> Result<Decimal, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let amount = match parse_positive(amount, &mut errors) {
            Some(a) if a > self.config.top_up_limit => {
                errors.push(ValidationError::TopUpExceedsLimit {
                    limit: self.config.top_up_limit,
                });
                None
            }
            Some(a) if a > self.config.transfer_limit => {
                errors.push(ValidationError::AmountExceedsLimit {
                    limit: self.config.transfer_limit,
                });
                None
            }
            other => other,
        };
        self.check_note(note, &mut errors);

        match amount {
            Some(amount) if errors.is_empty() => Ok(amount),
            _ => Err(errors),
        }
    }

    /// Parsed positive amount. An amount over the limit is still returned
    /// so the balance rule can run on it.
    fn check_transfer_amount(&self, raw: &str, errors: &mut ValidationErrors) -> Option<Decimal> {
        let amount = parse_positive(raw, errors)?;
        if amount > self.config.transfer_limit {
            errors.push(ValidationError::AmountExceedsLimit {
                limit: self.config.transfer_limit,
            });
        }
        Some(amount)
    }

    fn check_note(&self, note: Option<&str>, errors: &mut ValidationErrors) {
        if let Some(note) = note
            && note.chars().count() > self.config.note_max_chars
        {
            errors.push(ValidationError::NoteTooLong {
                max: self.config.note_max_chars,
            });
        }
    }
}

fn parse_positive(raw: &str, errors: &mut ValidationErrors) -> Option<Decimal> {
    match money::parse_amount(raw) {
        Ok(amount) if amount > Decimal::ZERO => Some(amount),
        Ok(_) => {
            errors.push(ValidationError::AmountNotPositive);
            None
        }
        Err(MoneyError::Missing) => {
            errors.push(ValidationError::AmountRequired);
            None
        }
        Err(MoneyError::InvalidFormat(_)) => {
            errors.push(ValidationError::AmountNotNumeric);
            None
        }
    }
}

fn check_recipient(
    recipient: Option<&UserId>,
    sender: &UserId,
    known_users: Option<&[User]>,
    errors: &mut ValidationErrors,
) -> Option<UserId> {
    let recipient = match recipient {
        Some(id) if !id.is_blank() => id,
        _ => {
            errors.push(ValidationError::RecipientRequired);
            return None;
        }
    };

    if recipient.as_str().trim() == sender.as_str().trim() {
        errors.push(ValidationError::SelfTransfer);
        return None;
    }

    if let Some(users) = known_users
        && !users.is_empty()
        && !users.iter().any(|u| &u.id == recipient)
    {
        errors.push(ValidationError::RecipientNotFound);
        return None;
    }

    Some(recipient.clone())
}

fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gate() -> ValidationGate {
        ValidationGate::new(WalletConfig::default())
    }

    fn input(recipient: Option<&str>, amount: &str, note: Option<&str>) -> TransferInput {
        TransferInput {
            sender_id: "1".into(),
            recipient_id: recipient.map(UserId::from),
            amount: amount.to_string(),
            note: note.map(str::to_string),
        }
    }

    fn directory() -> Vec<User> {
        vec![
            User {
                id: "1".into(),
                name: "Asha".into(),
                balance: dec!(5000),
            },
            User {
                id: "2".into(),
                name: "Ravi".into(),
                balance: dec!(100),
            },
        ]
    }

    #[test]
    fn test_valid_transfer() {
        let order = gate()
            .check(&input(Some("2"), "500", Some(" rent ")), None, Some(dec!(5000)))
            .unwrap();

        assert_eq!(order.sender_id().as_str(), "1");
        assert_eq!(order.recipient_id().as_str(), "2");
        assert_eq!(order.amount(), dec!(500));
        assert_eq!(order.note(), Some("rent"));
    }

    #[test]
    fn test_exact_balance_is_sufficient() {
        assert!(
            gate()
                .check(&input(Some("2"), "500", None), None, Some(dec!(510)))
                .is_ok()
        );
    }

    #[test]
    fn test_insufficient_balance() {
        let errors = gate()
            .check(&input(Some("2"), "500", None), None, Some(dec!(100)))
            .unwrap_err();

        assert_eq!(
            errors.errors,
            vec![ValidationError::InsufficientBalance {
                available: dec!(100),
                required: dec!(510),
                fee: dec!(10),
            }]
        );
        assert_eq!(
            errors.to_string(),
            "Insufficient balance. You have 100.00, but need 510.00 (including 10.00 fee)"
        );
    }

    #[test]
    fn test_errors_are_aggregated() {
        let long_note = "x".repeat(201);
        let errors = gate()
            .check(&input(Some("1"), "0", Some(long_note.as_str())), None, Some(dec!(5000)))
            .unwrap_err();

        assert_eq!(
            errors.errors,
            vec![
                ValidationError::AmountNotPositive,
                ValidationError::SelfTransfer,
                ValidationError::NoteTooLong { max: 200 },
            ]
        );
        assert_eq!(
            errors.to_string(),
            "Amount must be greater than 0. Cannot transfer money to yourself. \
             Note cannot exceed 200 characters"
        );
    }

    #[test]
    fn test_amount_rules() {
        let g = gate();
        let first = |amount: &str| {
            g.check(&input(Some("2"), amount, None), None, None)
                .unwrap_err()
                .errors[0]
                .clone()
        };

        assert_eq!(first(""), ValidationError::AmountRequired);
        assert_eq!(first("abc"), ValidationError::AmountNotNumeric);
        assert_eq!(first("-5"), ValidationError::AmountNotPositive);
        assert_eq!(
            first("50000.01"),
            ValidationError::AmountExceedsLimit {
                limit: dec!(50000)
            }
        );
        assert!(g.check(&input(Some("2"), "50000", None), None, None).is_ok());
    }

    #[test]
    fn test_over_limit_amount_still_checks_balance() {
        let errors = gate()
            .check(&input(Some("2"), "60000", None), None, Some(dec!(100)))
            .unwrap_err();

        assert_eq!(
            errors.errors,
            vec![
                ValidationError::AmountExceedsLimit {
                    limit: dec!(50000)
                },
                ValidationError::InsufficientBalance {
                    available: dec!(100),
                    required: dec!(61200),
                    fee: dec!(1200),
                },
            ]
        );
    }

    #[test]
    fn test_recipient_rules() {
        let g = gate();
        let users = directory();

        let errors = g.check(&input(None, "10", None), None, None).unwrap_err();
        assert_eq!(errors.errors, vec![ValidationError::RecipientRequired]);

        let errors = g.check(&input(Some("  "), "10", None), None, None).unwrap_err();
        assert_eq!(errors.errors, vec![ValidationError::RecipientRequired]);

        let errors = g
            .check(&input(Some("7"), "10", None), Some(users.as_slice()), None)
            .unwrap_err();
        assert_eq!(errors.errors, vec![ValidationError::RecipientNotFound]);

        // Empty directory means "unknown", not "nobody exists"
        let empty: Vec<User> = Vec::new();
        assert!(
            g.check(&input(Some("7"), "10", None), Some(empty.as_slice()), None)
                .is_ok()
        );
        assert!(
            g.check(&input(Some("2"), "10", None), Some(users.as_slice()), None)
                .is_ok()
        );
    }

    #[test]
    fn test_note_length_counts_characters() {
        let g = gate();
        let note = "₹".repeat(200);
        assert!(g.check(&input(Some("2"), "10", Some(note.as_str())), None, None).is_ok());
    }

    #[test]
    fn test_top_up_rules() {
        let g = gate();
        assert_eq!(g.check_top_up("250", None).unwrap(), dec!(250));

        let errors = g.check_top_up("0", None).unwrap_err();
        assert_eq!(errors.errors, vec![ValidationError::AmountNotPositive]);

        let errors = g.check_top_up("150000", None).unwrap_err();
        assert_eq!(
            errors.errors,
            vec![ValidationError::TopUpExceedsLimit {
                limit: dec!(100000)
            }]
        );

        let errors = g.check_top_up("60000", None).unwrap_err();
        assert_eq!(
            errors.errors,
            vec![ValidationError::AmountExceedsLimit {
                limit: dec!(50000)
            }]
        );
    }

    #[tokio::test]
    async fn test_validate_uses_live_balance() {
        let store = crate::store::MemoryStore::new();
        for user in directory() {
            store.insert_user(user);
        }

        let g = gate();
        let rejected = g
            .validate(&store, &input(Some("1"), "500", None), None)
            .await;
        assert!(matches!(rejected, Err(PreflightError::Rejected(_))));

        let mut sender_poor = input(Some("1"), "500", None);
        sender_poor.sender_id = "2".into();
        match g.validate(&store, &sender_poor, None).await {
            Err(PreflightError::Rejected(errors)) => assert!(
                errors.contains(|e| matches!(e, ValidationError::InsufficientBalance { .. }))
            ),
            other => panic!("expected rejection, got {:?}", other),
        }

        let missing = TransferInput {
            sender_id: "9".into(),
            ..input(Some("1"), "5", None)
        };
        assert!(matches!(
            g.validate(&store, &missing, None).await,
            Err(PreflightError::Store(_))
        ));
    }
}
