//! Error taxonomy for the token lifecycle.
//!
//! Every fallible operation in the crate funnels into [`LifecycleError`].
//! The retry executor consults [`LifecycleError::is_retryable`] to decide
//! whether an attempt may be repeated; everything else propagates to the
//! orchestrator, which halts the lifecycle at its last confirmed stage.

use thiserror::Error;

use crate::authority::AuthorityRole;

/// Unified error type for lifecycle orchestration.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// Malformed or missing persisted record. Fatal, never retried.
    #[error("config error: {0}")]
    Config(String),

    /// A required authority role is revoked or has no signing wallet bound.
    ///
    /// Raised before any transaction is constructed, so a revoked role can
    /// never produce a submission.
    #[error("signer unavailable for {role}: {reason}")]
    SignerUnavailable {
        role: AuthorityRole,
        reason: String,
    },

    /// A signer was required that no wallet, role, or ephemeral keypair covers.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Network, timeout, or RPC congestion. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The ledger reported an on-chain execution failure. Fatal, carries the
    /// reported payload verbatim.
    #[error("execution failed during {stage}: {payload}")]
    Execution { stage: String, payload: String },

    /// The validity window elapsed with no observed execution. The caller
    /// must rebuild with a fresh reference point; stale bytes are never
    /// resubmitted.
    #[error("validity window expired at height {expiry_height}")]
    ExpiredWindow { expiry_height: u64 },

    /// No bump byte in the full range produced an off-curve address.
    #[error("address derivation exhausted the bump range")]
    AddressDerivationExhausted,

    /// An operation was invoked out of stage order.
    #[error("{operation} requires stage {expected}, lifecycle is at {actual}")]
    Precondition {
        operation: String,
        expected: String,
        actual: String,
    },

    /// The confirmation gate refused an irreversible step.
    #[error("operator declined irreversible step: {0}")]
    Declined(String),

    /// A pending wait was abandoned between polls. The submission may still
    /// land; the caller must resync before resuming.
    #[error("wait abandoned during {0}; resync ledger state before resuming")]
    Interrupted(String),

    /// Internal invariant violation or unexpected state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    /// Whether retrying the operation might succeed.
    ///
    /// Only transient transport conditions and an elapsed validity window
    /// qualify; an expired window is retried by rebuilding, not by resending.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ExpiredWindow { .. }
        )
    }

    /// Error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::SignerUnavailable { .. } => "signer",
            Self::Signing(_) => "signing",
            Self::Transport(_) => "transport",
            Self::Execution { .. } => "execution",
            Self::ExpiredWindow { .. } => "expired",
            Self::AddressDerivationExhausted => "derivation",
            Self::Precondition { .. } => "precondition",
            Self::Declined(_) => "declined",
            Self::Interrupted(_) => "interrupted",
            Self::Internal(_) => "internal",
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    pub fn signer_unavailable(role: AuthorityRole, reason: impl Into<String>) -> Self {
        Self::SignerUnavailable {
            role,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(LifecycleError::transport("connection reset").is_retryable());
        assert!(LifecycleError::ExpiredWindow { expiry_height: 42 }.is_retryable());

        assert!(!LifecycleError::config("missing field").is_retryable());
        assert!(!LifecycleError::Execution {
            stage: "mint_supply".into(),
            payload: "insufficient funds".into(),
        }
        .is_retryable());
        assert!(!LifecycleError::signer_unavailable(AuthorityRole::MintAuthority, "revoked")
            .is_retryable());
        assert!(!LifecycleError::AddressDerivationExhausted.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = LifecycleError::Execution {
            stage: "create_mint".into(),
            payload: "custom program error: 0x1".into(),
        };
        assert_eq!(
            err.to_string(),
            "execution failed during create_mint: custom program error: 0x1"
        );

        let err = LifecycleError::signer_unavailable(AuthorityRole::MintAuthority, "revoked");
        assert!(err.to_string().contains("mint authority"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(LifecycleError::transport("x").category(), "transport");
        assert_eq!(
            LifecycleError::ExpiredWindow { expiry_height: 1 }.category(),
            "expired"
        );
        assert_eq!(LifecycleError::internal("x").category(), "internal");
    }
}
