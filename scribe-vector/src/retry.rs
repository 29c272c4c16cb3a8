//! A pure retry policy with exponential backoff.
//!
//! The policy is data (attempt cap and backoff schedule) plus a generic
//! driver over any fallible async operation; it carries no knowledge of the
//! connectivity check it usually wraps.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, VectorError};

/// Retry schedule: up to `max_attempts` tries, sleeping `base_delay * 2^n`
/// between attempt `n` and `n + 1` (so 2s, 4s, 8s... with a 2s base).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per subsequent retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given attempt cap and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// The delay to sleep after the given 1-based failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Drive `operation` until it succeeds, a non-retryable error occurs, or
    /// the attempt cap is exhausted.
    ///
    /// Only errors whose [`is_retryable`](VectorError::is_retryable) is true
    /// are retried; anything else is returned immediately. The final error
    /// after exhaustion is wrapped with the attempt count and the last cause.
    pub async fn run<T, F, Fut>(&self, description: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(VectorError::Connection {
                        message: format!(
                            "{description} failed after {attempt} attempts: {err}"
                        ),
                    });
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "{description} failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(4, Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let calls = AtomicU32::new(0);
        let result = policy
            .run("probe", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(VectorError::Connection { message: "down".into() })
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_aggregated_error_after_exhaustion() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let result: Result<()> = policy
            .run("probe", || async {
                Err(VectorError::Connection { message: "down".into() })
            })
            .await;
        match result {
            Err(VectorError::Connection { message }) => {
                assert!(message.contains("after 2 attempts"), "got: {message}");
            }
            other => panic!("expected connection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy
            .run("probe", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(VectorError::Config("bad".into()))
            })
            .await;
        assert!(matches!(result, Err(VectorError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
