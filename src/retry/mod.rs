//! Retrying executor for operations that can fail transiently.
//!
//! Retries only on errors classified as transient (connection reset,
//! timeout, connection refused, connection terminated). Delays follow
//! exponential backoff with full jitter, capped.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Classification hook for the retrying executor.
pub trait Transient {
    /// Whether retrying the same operation may succeed.
    fn is_transient(&self) -> bool;
}

/// Retry budget and backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Upper bound of the jittered delay after the given (1-based) attempt.
    fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// `min(random(0, base * 2^attempt), cap)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        let jittered = if ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..ceiling)
        };
        Duration::from_millis(jittered).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. The last error is returned unchanged.
pub async fn execute_with_retry<T, E, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= max_attempts {
                    error!("{} failed after {} attempt(s): {}", label, attempt, err);
                    return Err(err);
                }

                let delay = policy.backoff_delay(attempt);
                warn!(
                    "{}: transient failure ({}), retry {}/{} after {}ms",
                    label,
                    err,
                    attempt,
                    max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum FakeError {
        #[error("connection reset")]
        Reset,
        #[error("bad input")]
        Logic,
    }

    impl Transient for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Reset)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_error_runs_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FakeError> =
            execute_with_retry("logic", &RetryPolicy::default(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Logic) }
            })
            .await;

        assert!(matches!(result, Err(FakeError::Logic)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_then_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::with_max_attempts(4);
        let failures = 3;

        let result = execute_with_retry("flaky", &policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < failures {
                    Err(FakeError::Reset)
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FakeError> =
            execute_with_retry("down", &RetryPolicy::default(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Reset) }
            })
            .await;

        assert!(matches!(result, Err(FakeError::Reset)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        for attempt in 1..20 {
            let delay = policy.backoff_delay(attempt);
            assert!(delay <= policy.max_delay);
            assert!(delay < policy.ceiling(attempt).max(Duration::from_millis(1)));
        }
    }
}
