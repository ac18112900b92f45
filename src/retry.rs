//! Generic retry-with-backoff around fallible async operations.
//!
//! One policy value object governs every retried call site. The executor
//! distinguishes transient failures (which back off and retry) from fatal
//! ones (which abort immediately); idempotency of the wrapped operation
//! under retry is the caller's responsibility.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{LifecycleError, Result};

/// Retry configuration: attempt budget plus backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
    /// Cap on any single backoff delay in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0) added to each delay to avoid thundering herd.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Policy with no jitter, useful where deterministic delays matter.
    pub fn fixed(max_attempts: u32, base_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            multiplier,
            max_delay_ms: u64::MAX,
            jitter_factor: 0.0,
        }
    }

    /// Backoff delay for a given attempt (0-indexed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = (self.base_delay_ms as f64) * self.multiplier.powi(attempt as i32);
        let capped = exp.min(self.max_delay_ms as f64);

        let jitter_range = capped * self.jitter_factor;
        let jittered = if jitter_range > 0.0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(jittered as u64)
    }
}

/// Run `operation` under `policy`, retrying transient failures with
/// exponential backoff.
///
/// Fatal errors abort immediately. After the attempt budget is exhausted the
/// last transient error propagates.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start_time = std::time::Instant::now();
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                "Retrying operation"
            );
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    warn!(
                        operation = operation_name,
                        category = err.category(),
                        error = %err,
                        "Fatal error, not retrying"
                    );
                    return Err(err);
                }

                last_error = Some(err.clone());

                if attempt + 1 < policy.max_attempts {
                    let backoff = policy.backoff_delay(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Transient error, backing off before retry"
                    );
                    sleep(backoff).await;
                } else {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "All retry attempts exhausted"
                    );
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| LifecycleError::internal("retry exhausted without an error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_on_first_attempt() {
        let policy = RetryPolicy::fixed(3, 10, 2.0);
        let result = retry_with_backoff("test_op", &policy, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_succeeds_after_k_transient_failures() {
        let policy = RetryPolicy::fixed(4, 5, 2.0);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_with_backoff("test_op", &policy, || {
            let count = attempts_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(LifecycleError::transport("connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        // Exactly k+1 calls for k transient failures.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_immediately() {
        let policy = RetryPolicy::fixed(5, 5, 2.0);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = retry_with_backoff("test_op", &policy, || {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LifecycleError::Execution {
                    stage: "test".into(),
                    payload: "insufficient funds".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(LifecycleError::Execution { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_exactly_max_attempts() {
        let policy = RetryPolicy::fixed(3, 5, 2.0);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<()> = retry_with_backoff("test_op", &policy, || {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            async { Err(LifecycleError::transport("timeout")) }
        })
        .await;

        assert!(matches!(result, Err(LifecycleError::Transport(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_expired_window_is_retried() {
        let policy = RetryPolicy::fixed(2, 5, 2.0);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_with_backoff("test_op", &policy, || {
            let count = attempts_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count == 0 {
                    Err(LifecycleError::ExpiredWindow { expiry_height: 100 })
                } else {
                    Ok("landed")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "landed");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_sequence_is_geometric_without_jitter() {
        let policy = RetryPolicy::fixed(5, 100, 2.0);
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(800));

        let tripled = RetryPolicy::fixed(5, 50, 3.0);
        assert_eq!(tripled.backoff_delay(0), Duration::from_millis(50));
        assert_eq!(tripled.backoff_delay(1), Duration::from_millis(150));
        assert_eq!(tripled.backoff_delay(2), Duration::from_millis(450));
    }

    #[test]
    fn test_backoff_respects_cap_and_jitter_bounds() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 2_000,
            jitter_factor: 0.2,
        };

        let delay = policy.backoff_delay(1);
        assert!(delay.as_millis() >= 160 && delay.as_millis() <= 240); // ~200ms ± 20%

        let capped = policy.backoff_delay(10);
        assert!(capped.as_millis() <= 2_400); // max 2000ms + 20% jitter
    }
}
