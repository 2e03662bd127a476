//! Bounded retry and timeout wrappers.
//!
//! One reusable policy shared by store initialization, catalog loads, and
//! post-purchase status refresh: wrap an operation with a maximum wait time,
//! and, where specified, a bounded number of retries with increasing delay.

use std::future::Future;
use std::time::Duration;

use crate::config::PurchaseConfig;
use crate::error::{Result, TollgateError};

/// Retry policy: bounded attempts with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Ceiling on the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Derive the policy from the configuration surface.
    #[must_use]
    pub fn from_config(config: &PurchaseConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
        }
    }

    /// Delay before the next attempt: `base * 2^attempt` with jitter,
    /// capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt)).min(max_ms);

        // Jitter of 0-25% of the delay keeps concurrent retriers apart.
        let jitter = if delay_ms > 0 {
            fastrand::u64(0..=delay_ms / 4)
        } else {
            0
        };
        Duration::from_millis(delay_ms.saturating_add(jitter))
    }
}

/// Wrap an operation with a maximum wait time.
///
/// Elapsing the deadline yields [`TollgateError::ConnectionTimeout`] carrying
/// the operation name.
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(TollgateError::ConnectionTimeout {
            operation: operation.to_string(),
        }),
    }
}

/// Execute an operation with bounded, iterative retries.
///
/// Only errors classified retryable by the taxonomy are retried; anything
/// else (configuration problems, cancellation, validation failures) returns
/// immediately. After the attempt budget is exhausted the last error is
/// returned; non-critical call sites log and swallow it instead of
/// propagating.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, operation_fn: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff_delay(attempt);
                tracing::warn!(
                    target: "tollgate::retry",
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };

        // attempt 0: 100ms base, up to +25% jitter
        let d0 = policy.backoff_delay(0);
        assert!(d0 >= Duration::from_millis(100) && d0 <= Duration::from_millis(125));

        // attempt 3 would be 800ms; capped at 400 plus jitter
        let d3 = policy.backoff_delay(3);
        assert!(d3 >= Duration::from_millis(400) && d3 <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&fast_policy(5), "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TollgateError::ConnectionTimeout {
                        operation: "flaky".to_string(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&fast_policy(3), "always-down", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TollgateError::ConnectionTimeout {
                    operation: "always-down".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(TollgateError::ConnectionTimeout { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&fast_policy(5), "misconfigured", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TollgateError::ConfigurationInvalid("bad".to_string())) }
        })
        .await;

        assert!(matches!(
            result,
            Err(TollgateError::ConfigurationInvalid(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed_to_connection_timeout() {
        let result: Result<()> = with_timeout(
            "slow op",
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        match result {
            Err(TollgateError::ConnectionTimeout { operation }) => {
                assert_eq!(operation, "slow op");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_success() {
        let result = with_timeout("fast op", Duration::from_millis(100), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
