//! Shared HTTP plumbing for provider clients: timeouts, error mapping and bounded retry.

use crate::config::RetrySettings;
use crate::error::{KbError, Result};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default per-request timeout for provider calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Build a reqwest client with the given per-request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| KbError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Map a transport-level reqwest error to a provider error.
pub fn transport_error(provider: &'static str, err: reqwest::Error) -> KbError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        KbError::transient(provider, err.to_string())
    } else {
        KbError::provider(provider, err.to_string())
    }
}

/// Map a non-success HTTP status to a provider error. 429 and 5xx are retryable.
pub fn status_error(provider: &'static str, status: StatusCode, body: &str) -> KbError {
    let body = body.trim();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.chars().take(500).collect::<String>())
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        KbError::transient(provider, message)
    } else {
        KbError::provider(provider, message)
    }
}

/// Bounded exponential backoff for retryable provider errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what, attempt, self.max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500), Duration::from_millis(3000));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_millis(3000));
    }

    #[test]
    fn test_status_classification() {
        assert!(status_error("x", StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(status_error("x", StatusCode::BAD_GATEWAY, "upstream").is_retryable());
        assert!(!status_error("x", StatusCode::UNAUTHORIZED, "bad key").is_retryable());
        assert!(status_error("x", StatusCode::FORBIDDEN, "quota")
            .to_string()
            .contains("quota"));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(KbError::transient("x", "503"))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(2)
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(KbError::transient("x", "timeout"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_not_available() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(5)
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(KbError::NotAvailable("abc".to_string()))
            })
            .await;

        assert!(matches!(result, Err(KbError::NotAvailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
