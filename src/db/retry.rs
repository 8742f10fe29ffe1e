use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{ApiError, ErrorClass};

/// Retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Bounded exponential backoff around a fallible API call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub retryable: Vec<ErrorClass>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
            retryable: vec![
                ErrorClass::RateLimited,
                ErrorClass::ServerError,
                ErrorClass::Network,
                ErrorClass::Timeout,
            ],
        }
    }

    /// `retries` counts the calls after the first one.
    pub fn with_retries(retries: u32, initial_delay: Duration) -> Self {
        Self::new(retries.saturating_add(1), initial_delay)
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_retryable(mut self, retryable: Vec<ErrorClass>) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_retryable(&self, err: &ApiError) -> bool {
        self.retryable.contains(&err.class())
    }

    /// Delay before the retry that follows `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            debug!("{} (attempt {}/{})", operation, attempt, self.max_attempts);
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && self.is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed with {:?} (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        e.class(),
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if self.is_retryable(&e) {
                        warn!("{} failed after {} attempts: {}", operation, attempt, e);
                    } else {
                        debug!("{} failed with non-retryable {:?}: {}", operation, e.class(), e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_retries(DEFAULT_MAX_RETRIES, Duration::from_secs(2))
    }
}
