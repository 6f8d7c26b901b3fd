//! Peer-to-Peer Transfers
//!
//! Moves money between two users of a resource store that has no
//! cross-record transactions. A transfer is a saga of independent writes
//! keyed by its debit:
//!
//! ```text
//! NONE → PENDING → SUCCESS
//!           ↓
//!         FAILED (+ refund credit once the sender was charged)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Pre-check before write**: balance and recipient are re-read before the
//!    first record is created
//! 2. **Charge once, settle once**: after the sender is charged, the debit
//!    ends with either one completion credit or one refund credit, never both
//! 3. **Refund exactness**: a refund is always debit amount plus fee
//! 4. **Reconcilable**: any interrupted saga leaves a `pending` debit that
//!    the reconciliation pass can finish

pub mod error;
pub mod saga;
pub mod settle;
pub mod state;

pub use error::TransferError;
pub use saga::{TransferReceipt, TransferSaga};
pub use settle::{Settlement, TransferLinks};
pub use state::SagaStep;
