//! Confirmation gate for irreversible lifecycle steps.
//!
//! Revoking the mint authority or freezing metadata can never be undone, so
//! the orchestrator refuses to attempt either without an affirmative answer
//! from an injected gate. Human operators get two sequential prompts, the
//! second demanding an exact literal phrase; automation and tests inject a
//! policy answer instead.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use tracing::info;

use crate::error::{LifecycleError, Result};

#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// Whether the named irreversible step may proceed.
    async fn confirm(&self, step_name: &str) -> Result<bool>;
}

/// Interactive gate: `yes` to the first prompt, then the exact confirmation
/// phrase to the second. Anything else declines.
pub struct InteractiveGate {
    phrase: String,
}

impl InteractiveGate {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
        }
    }
}

#[async_trait]
impl ConfirmationGate for InteractiveGate {
    async fn confirm(&self, step_name: &str) -> Result<bool> {
        let step = step_name.to_string();
        let phrase = self.phrase.clone();

        // Terminal prompts block, so keep them off the async runtime.
        tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            let mut answer = String::new();

            write!(
                stdout,
                "'{step}' is irreversible and cannot be undone. Continue? (yes/no): "
            )
            .and_then(|_| stdout.flush())
            .map_err(|err| LifecycleError::internal(format!("prompt failed: {err}")))?;
            stdin
                .lock()
                .read_line(&mut answer)
                .map_err(|err| LifecycleError::internal(format!("prompt failed: {err}")))?;
            if answer.trim().to_lowercase() != "yes" {
                return Ok(false);
            }

            answer.clear();
            write!(stdout, "Type {phrase} to confirm: ")
                .and_then(|_| stdout.flush())
                .map_err(|err| LifecycleError::internal(format!("prompt failed: {err}")))?;
            stdin
                .lock()
                .read_line(&mut answer)
                .map_err(|err| LifecycleError::internal(format!("prompt failed: {err}")))?;

            Ok(answer.trim() == phrase)
        })
        .await
        .map_err(|err| LifecycleError::internal(format!("prompt task failed: {err}")))?
    }
}

/// Fixed-answer gate for automated contexts and tests.
pub struct PolicyGate {
    approve: bool,
}

impl PolicyGate {
    pub fn approving() -> Self {
        Self { approve: true }
    }

    pub fn declining() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl ConfirmationGate for PolicyGate {
    async fn confirm(&self, step_name: &str) -> Result<bool> {
        info!(
            step = %step_name,
            approved = self.approve,
            "Policy gate answered"
        );
        Ok(self.approve)
    }
}
