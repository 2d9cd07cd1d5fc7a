//! Shared retry policy for transport operations

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default attempts per operation (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the second attempt
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Growth factor between consecutive delays
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Failure of a single attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Worth another attempt (5xx, 429, timeouts, connection errors)
    #[error("{0}")]
    Retryable(String),

    /// Another attempt cannot succeed (backend tool vanished)
    #[error("{0}")]
    Fatal(String),
}

/// Terminal failure of a retried operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("{last_error} (after {attempts} attempts)")]
    Exhausted { attempts: u32, last_error: String },

    #[error("{0}")]
    Aborted(String),
}

/// Exponential backoff without jitter: the delay before attempt `n + 1` is
/// `base_delay * multiplier^(n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl BackoffPolicy {
    /// Policy with `max_attempts` attempts (at least one) and default timing
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.base_delay.mul_f64(self.multiplier.powi(exponent))
    }

    /// Run `attempt_fn` until it succeeds, fails fatally, or the attempt
    /// budget runs out. `attempt_fn` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(TransportError::Fatal(reason)) => return Err(RetryError::Aborted(reason)),
                Err(TransportError::Retryable(reason)) => {
                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last_error: reason,
                        });
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_delay_schedule() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_new_clamps_attempts() {
        assert_eq!(BackoffPolicy::new(0).max_attempts, 1);
        assert_eq!(BackoffPolicy::new(5).max_attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = BackoffPolicy::default();
        let start = Instant::now();

        let result = policy
            .run("PUT", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TransportError::Retryable("PUT status 503".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 0.5s + 1.0s of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reports_last_reason() {
        let policy = BackoffPolicy::new(2);
        let result: Result<(), _> = policy
            .run("GET", |attempt| async move {
                Err(TransportError::Retryable(format!("GET status 500 #{attempt}")))
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 2,
                last_error: "GET status 500 #2".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = BackoffPolicy::default()
            .run("PUT", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransportError::Fatal("wrangler not found".into())) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Aborted("wrangler not found".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
