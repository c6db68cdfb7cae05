//! Retry utilities for outbound provider calls with exponential backoff.
//!
//! Every geocoding, weather and points-of-interest request goes through
//! [`with_retry`]. Whether a failure is worth another attempt is decided by
//! the error itself via [`Retryable`]:
//! - Timeouts, connection failures
//! - 5xx server errors, 408 and 429
//!
//! It does NOT retry:
//! - Other 4xx client errors (bad requests, not found, bad key)
//! - Malformed responses

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

/// Default retry configuration
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Initial delay between retries (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Config that makes exactly `attempts` calls in total (at least one).
    pub fn with_max_attempts(attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self::new(attempts.saturating_sub(1), initial_delay_ms, max_delay_ms)
    }

    /// Total number of calls, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Exponential backoff: initial_delay * 2^attempt
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Should retry the request
    Retry,
    /// Should not retry - permanent failure
    NoRetry,
}

/// Errors that know whether they are transient.
pub trait Retryable {
    fn retry_decision(&self) -> RetryDecision;

    fn is_transient(&self) -> bool {
        self.retry_decision() == RetryDecision::Retry
    }
}

/// Check if a status code is retryable
pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    // 5xx server errors are retryable
    if status.is_server_error() {
        tracing::debug!("Server error ({}), will retry", status);
        return RetryDecision::Retry;
    }

    // 429 Too Many Requests - should retry with backoff
    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::debug!("Rate limited (429), will retry");
        return RetryDecision::Retry;
    }

    // 408 Request Timeout - retryable
    if status == StatusCode::REQUEST_TIMEOUT {
        tracing::debug!("Request timeout (408), will retry");
        return RetryDecision::Retry;
    }

    // Everything else (4xx including 401/403, success, redirects) is final
    RetryDecision::NoRetry
}

/// Execute an operation with retry logic.
///
/// Transient failures are retried with exponential backoff until
/// `config.max_attempts()` calls have been made; the last transient error is
/// then returned. Non-transient failures are returned immediately.
///
/// # Example
/// ```ignore
/// let coords = with_retry(&RetryConfig::default(), || geocoder.geocode("Kraków")).await?;
/// ```
///
/// # Errors
/// The last error produced by `operation`.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let total = config.max_attempts();
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt - 1);
            tracing::info!(
                "Retry attempt {} of {}, waiting {:?}",
                attempt,
                config.max_retries,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("Request succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_transient() {
                    tracing::debug!("Non-retryable error: {}", e);
                    return Err(e);
                }

                if attempt + 1 >= total {
                    tracing::error!("All {} retry attempts exhausted: {}", total, e);
                    return Err(e);
                }

                tracing::warn!(
                    "Retryable error on attempt {} of {}: {}",
                    attempt + 1,
                    total,
                    e
                );
            }
        }

        attempt += 1;
    }
}
