//! Confirmation tracking: resolve a submitted transaction to an outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Signature;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{LifecycleError, Result};
use crate::ledger::{ExecutionStatus, LedgerClient};
use crate::tx_builder::pending::{PendingTransaction, TxStatus};

/// Terminal outcome of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed(Signature),
    /// Executed on-chain and failed; carries the reported error payload.
    Failed(String),
    /// The validity window lapsed with no observed execution. The caller
    /// must rebuild with a fresh window, never resend the same bytes.
    Expired,
    /// The caller stopped waiting. The submission may still land; ledger
    /// state must be re-derived before the lifecycle resumes.
    Abandoned,
}

/// Polls the ledger until a submitted transaction reaches an outcome.
pub struct ConfirmationTracker {
    ledger: Arc<dyn LedgerClient>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ConfirmationTracker {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            cancel: None,
        }
    }

    /// Install a cancellation flag. The flag is honored only between polls;
    /// an already-submitted transaction cannot be un-submitted.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Block until the submission executes, fails, or its window lapses.
    ///
    /// Expiry is judged by ledger height passing the transaction's expiry
    /// height while no execution status is observable; that yields
    /// `Expired`, not `Failed`.
    pub async fn await_outcome(
        &self,
        tx: &mut PendingTransaction,
        poll_interval: Duration,
    ) -> Result<TxOutcome> {
        if tx.status != TxStatus::Submitted {
            return Err(LifecycleError::internal(format!(
                "await_outcome called on transaction in state {:?}",
                tx.status
            )));
        }
        let signature = tx
            .signature
            .ok_or_else(|| LifecycleError::internal("submitted transaction has no signature"))?;

        loop {
            if let Some(cancel) = &self.cancel {
                if cancel.load(Ordering::SeqCst) {
                    warn!(signature = %signature, "Wait abandoned; submission may still land");
                    return Ok(TxOutcome::Abandoned);
                }
            }

            match self.ledger.execution_status(&signature).await? {
                ExecutionStatus::Succeeded => {
                    debug!(signature = %signature, "Transaction confirmed");
                    tx.status = TxStatus::Confirmed;
                    return Ok(TxOutcome::Confirmed(signature));
                }
                ExecutionStatus::Failed(payload) => {
                    warn!(signature = %signature, payload = %payload, "Transaction failed on-chain");
                    tx.status = TxStatus::Failed;
                    return Ok(TxOutcome::Failed(payload));
                }
                ExecutionStatus::Pending => {
                    let height = self.ledger.current_height().await?;
                    if height > tx.expiry_height {
                        warn!(
                            signature = %signature,
                            height,
                            expiry_height = tx.expiry_height,
                            "Validity window lapsed with no execution"
                        );
                        tx.status = TxStatus::Expired;
                        return Ok(TxOutcome::Expired);
                    }
                }
            }

            sleep(poll_interval).await;
        }
    }
}
