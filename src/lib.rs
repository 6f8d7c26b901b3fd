//! mini_wallet - Wallet ledger over a plain resource store
//!
//! Users hold a cached balance; the transaction log is the source of truth.
//! Transfers are sagas of independent writes, and a startup reconciliation
//! pass repairs whatever a crash left behind.
//!
//! # Modules
//!
//! - [`core_types`] - Record ids
//! - [`money`] - Amount parsing, fee arithmetic, display
//! - [`models`] - User and Transaction records
//! - [`balance`] - Balance derivation from the log
//! - [`store`] - Resource store contract, REST client, in-memory store
//! - [`validation`] - Transfer and top-up rule checks
//! - [`transfer`] - Transfer saga with compensation
//! - [`reconcile`] - Startup reconciliation pass
//! - [`wallet`] - Top-up, balance check, delete/undo, history

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod logging;

pub mod balance;
pub mod models;
pub mod money;
pub mod store;
pub mod validation;

pub mod reconcile;
pub mod transfer;
pub mod wallet;

// Convenient re-exports at crate root
pub use balance::{BalanceCheck, check_balance, derive_balance};
pub use core_types::{RecordId, TransactionId, UserId};
pub use models::{NewTransaction, Transaction, TransactionPatch, TxKind, TxStatus, User};
pub use reconcile::{ReconcileError, ReconcileReport, Reconciler, RepairAction};
pub use store::{HttpStore, MemoryStore, ResourceStore, StoreError};
pub use transfer::{TransferError, TransferReceipt, TransferSaga};
pub use validation::{TransferInput, TransferOrder, ValidationError, ValidationErrors, ValidationGate};
pub use wallet::{HistoryPage, HistoryQuery, Wallet, WalletError};
