//! Retry with exponential backoff
//!
//! `RetryPolicy` wraps any fallible async operation. The caller decides which
//! errors are transient; everything else ends the loop at once without
//! touching the retry budget.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::infrastructure::config::defaults;

/// Retry budget and backoff shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further retry
    pub backoff_base: Duration,

    /// Upper bound (exclusive) of the random delay added to each backoff.
    /// Clamped to `backoff_base` so consecutive delays strictly increase.
    pub jitter: Duration,

    /// HTTP statuses worth retrying
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            backoff_base: Duration::from_millis(defaults::BACKOFF_BASE_MS),
            jitter: Duration::from_millis(defaults::JITTER_MS),
            retryable_statuses: defaults::RETRYABLE_STATUSES.to_vec(),
        }
    }
}

/// Result of running an operation under a policy
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Every backoff slept, in order
    pub backoffs: Vec<Duration>,
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// `backoff_base * 2^attempt + jitter`, `attempt` counted from zero
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .backoff_base
            .saturating_mul(2_u32.saturating_pow(attempt));
        exponential.saturating_add(self.sample_jitter())
    }

    fn sample_jitter(&self) -> Duration {
        let bound = self.jitter.min(self.backoff_base).as_millis();
        if bound == 0 {
            return Duration::ZERO;
        }
        let bound = u64::try_from(bound).unwrap_or(u64::MAX);
        Duration::from_millis(fastrand::u64(0..bound))
    }

    /// Run `operation` until it succeeds, fails terminally or the budget is spent.
    ///
    /// `operation` receives the zero-based attempt number.
    pub async fn run<T, E, F, Fut, C>(&self, mut operation: F, is_transient: C) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        let mut backoffs = Vec::new();

        loop {
            let result = operation(attempt).await;
            let error = match result {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                        backoffs,
                    };
                }
                Err(error) => error,
            };

            if !is_transient(&error) {
                debug!("Terminal failure on attempt {}: {}", attempt + 1, error);
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt + 1,
                    backoffs,
                };
            }
            if attempt >= self.max_retries {
                warn!("Giving up after {} attempts: {}", attempt + 1, error);
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt + 1,
                    backoffs,
                };
            }

            let delay = self.backoff_for(attempt);
            debug!(
                "Attempt {}/{} failed ({}), retrying in {:?}",
                attempt + 1,
                self.max_retries + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            backoffs.push(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(2),
            jitter: Duration::from_millis(1),
            retryable_statuses: vec![429, 500, 520],
        }
    }

    #[test]
    fn backoff_doubles_and_stays_within_jitter() {
        let policy = RetryPolicy {
            backoff_base: Duration::from_millis(100),
            jitter: Duration::from_millis(10),
            ..fast_policy(5)
        };
        for attempt in 0..5 {
            let delay = policy.backoff_for(attempt);
            let floor = Duration::from_millis(100 * 2_u64.pow(attempt));
            assert!(delay >= floor);
            assert!(delay < floor + Duration::from_millis(10));
        }
    }

    #[test]
    fn jitter_is_clamped_to_base() {
        let policy = RetryPolicy {
            backoff_base: Duration::from_millis(4),
            jitter: Duration::from_secs(60),
            ..fast_policy(5)
        };
        for _ in 0..50 {
            assert!(policy.backoff_for(0) < Duration::from_millis(8));
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = fast_policy(5)
            .run(
                |_| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { if n < 3 { Err("busy") } else { Ok(n) } }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.result, Ok(3));
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.backoffs.len(), 3);
        assert!(outcome.backoffs.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn exhausts_budget_with_max_retries_plus_one_attempts() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<(), &str> = fast_policy(3)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down") }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.result, Err("down"));
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.backoffs.len(), 3);
    }

    #[tokio::test]
    async fn terminal_error_stops_immediately() {
        let outcome: RetryOutcome<(), &str> = fast_policy(5)
            .run(|_| async { Err("not found") }, |e| *e != "not found")
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.backoffs.is_empty());
    }

    #[tokio::test]
    async fn attempt_number_is_passed_to_operation() {
        let outcome = fast_policy(2)
            .run(
                |attempt| async move { if attempt == 2 { Ok(attempt) } else { Err("retry") } },
                |_| true,
            )
            .await;
        assert_eq!(outcome.result, Ok(2));
    }
}
