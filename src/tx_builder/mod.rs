//! Transaction building, signing, submission, and confirmation tracking.
//!
//! The module is split into focused pieces:
//! - **pending**: the [`PendingTransaction`] unit and its status machine
//! - **builder**: instruction assembly, signer resolution, submission
//! - **confirm**: the bounded poll loop resolving a submission's outcome
//!
//! A pending transaction is bound to the validity window fetched at build
//! time. Once that window lapses the unit is dead: the caller rebuilds from
//! scratch with a fresh reference point rather than resubmitting stale bytes.

pub mod builder;
pub mod confirm;
pub mod pending;

pub use builder::TransactionBuilder;
pub use confirm::{ConfirmationTracker, TxOutcome};
pub use pending::{PendingTransaction, TxStatus};
