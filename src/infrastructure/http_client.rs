//! HTTP fetching for register pages
//!
//! `PageSource` performs exactly one GET. `Fetcher` wraps a source with the
//! retry policy and turns the final outcome into `PageBody` or `FetchFailure`,
//! so one bad URL never aborts its siblings.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::infrastructure::config::HttpClientConfig;
use crate::infrastructure::retry_policy::RetryPolicy;

/// Why a single attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchAttemptError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("failed to read body: {0}")]
    Body(String),
}

impl FetchAttemptError {
    /// Network-level errors are always transient; statuses only when listed
    pub fn is_transient(&self, policy: &RetryPolicy) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout | Self::Body(_) => true,
            Self::Status(status) => policy.is_retryable_status(*status),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailureReason {
    #[error("retries exhausted, last error: {0}")]
    RetriesExhausted(FetchAttemptError),

    #[error("non-retryable: {0}")]
    NonRetryable(FetchAttemptError),
}

/// Terminal failure for one URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to fetch {url} after {attempts} attempt(s): {reason}")]
pub struct FetchFailure {
    pub url: String,
    pub attempts: u32,
    pub reason: FetchFailureReason,
}

/// Successful response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBody {
    pub url: String,
    pub body: String,
    pub attempts: u32,
    /// Backoff slept before each retry
    pub backoffs: Vec<Duration>,
}

/// One GET, no retries. Success means status 200.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_once(&self, url: &str) -> Result<String, FetchAttemptError>;
}

/// reqwest-backed page source
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .pool_max_idle_per_host(config.max_concurrency)
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        info!(
            "🌐 HTTP client ready (timeout {}s, pool {})",
            config.timeout_seconds, config.max_concurrency
        );
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpClient {
    async fn fetch_once(&self, url: &str) -> Result<String, FetchAttemptError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchAttemptError::Timeout
            } else {
                FetchAttemptError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchAttemptError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchAttemptError::Timeout
            } else {
                FetchAttemptError::Body(e.to_string())
            }
        })
    }
}

/// Page source plus retry policy
pub struct Fetcher<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: PageSource> Fetcher<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn fetch(&self, url: &str) -> Result<PageBody, FetchFailure> {
        debug!("Fetching {}", url);
        let outcome = self
            .policy
            .run(
                |_| self.source.fetch_once(url),
                |error: &FetchAttemptError| error.is_transient(&self.policy),
            )
            .await;

        match outcome.result {
            Ok(body) => {
                if outcome.attempts > 1 {
                    info!("✅ {} fetched after {} attempts", url, outcome.attempts);
                }
                Ok(PageBody {
                    url: url.to_string(),
                    body,
                    attempts: outcome.attempts,
                    backoffs: outcome.backoffs,
                })
            }
            Err(error) => {
                let reason = if error.is_transient(&self.policy) {
                    FetchFailureReason::RetriesExhausted(error)
                } else {
                    FetchFailureReason::NonRetryable(error)
                };
                let failure = FetchFailure {
                    url: url.to_string(),
                    attempts: outcome.attempts,
                    reason,
                };
                warn!("❌ {}", failure);
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays canned attempt results in order
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, FetchAttemptError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, FetchAttemptError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PageSource for Scripted {
        async fn fetch_once(&self, _url: &str) -> Result<String, FetchAttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchAttemptError::Status(500)))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            backoff_base: Duration::from_millis(2),
            jitter: Duration::from_millis(1),
            retryable_statuses: vec![429, 500, 520],
        }
    }

    #[tokio::test]
    async fn retryable_statuses_then_success() {
        let source = Scripted::new(vec![
            Err(FetchAttemptError::Status(429)),
            Err(FetchAttemptError::Status(520)),
            Err(FetchAttemptError::Status(500)),
            Ok("<table></table>".to_string()),
        ]);
        let fetcher = Fetcher::new(source, policy());

        let page = fetcher.fetch("https://example.test/1").await.unwrap();
        assert_eq!(page.body, "<table></table>");
        assert_eq!(page.attempts, 4);
        assert_eq!(page.backoffs.len(), 3);
        assert!(page.backoffs.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn always_failing_url_uses_whole_budget() {
        let fetcher = Fetcher::new(Scripted::new(vec![]), policy());

        let failure = fetcher.fetch("https://example.test/down").await.unwrap_err();
        assert_eq!(failure.attempts, 6);
        assert_eq!(fetcher.source.calls.load(Ordering::SeqCst), 6);
        assert_eq!(
            failure.reason,
            FetchFailureReason::RetriesExhausted(FetchAttemptError::Status(500))
        );
    }

    #[tokio::test]
    async fn non_retryable_status_fails_without_retry() {
        let source = Scripted::new(vec![Err(FetchAttemptError::Status(404)), Ok("late".to_string())]);
        let fetcher = Fetcher::new(source, policy());

        let failure = fetcher.fetch("https://example.test/missing").await.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(
            failure.reason,
            FetchFailureReason::NonRetryable(FetchAttemptError::Status(404))
        );
    }

    #[tokio::test]
    async fn connection_errors_and_timeouts_are_retried() {
        let source = Scripted::new(vec![
            Err(FetchAttemptError::Connection("reset".into())),
            Err(FetchAttemptError::Timeout),
            Ok("ok".to_string()),
        ]);
        let page = Fetcher::new(source, policy())
            .fetch("https://example.test/flaky")
            .await
            .unwrap();
        assert_eq!(page.attempts, 3);
    }

    #[test]
    fn failure_message_names_url_and_attempts() {
        let failure = FetchFailure {
            url: "https://example.test/x".into(),
            attempts: 6,
            reason: FetchFailureReason::RetriesExhausted(FetchAttemptError::Timeout),
        };
        let message = failure.to_string();
        assert!(message.contains("https://example.test/x"));
        assert!(message.contains("6 attempt"));
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(HttpClient::new(&HttpClientConfig::default()).is_ok());
    }
}
