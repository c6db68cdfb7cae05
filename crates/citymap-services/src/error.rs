//! Provider call failures, classified for the retry policy.
//!
//! Every variant carries text that has already been masked, so a
//! `ProviderError` can be logged or shown as-is.

use reqwest::StatusCode;
use thiserror::Error;

use crate::redact::{mask_with, Credential};
use crate::retry::{is_retryable_status, RetryDecision, Retryable};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request error: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Classify a reqwest error. The URL is stripped and the remaining text
    /// masked before it is stored.
    pub fn from_reqwest(err: reqwest::Error, credential: Option<&Credential>) -> Self {
        let is_timeout = err.is_timeout();
        let is_connect = err.is_connect();
        let is_decode = err.is_decode();
        let status = err.status();
        let message = mask_with(&err.without_url().to_string(), credential);

        if is_timeout {
            ProviderError::Timeout(message)
        } else if is_connect {
            ProviderError::Connect(message)
        } else if let Some(status) = status {
            ProviderError::Status {
                status: status.as_u16(),
                message,
            }
        } else if is_decode {
            ProviderError::Decode(message)
        } else {
            ProviderError::Request(message)
        }
    }

    /// Build an error for a non-success response.
    pub fn from_status(status: StatusCode, body: &str, credential: Option<&Credential>) -> Self {
        ProviderError::Status {
            status: status.as_u16(),
            message: mask_with(body.trim(), credential),
        }
    }

    pub fn decode(message: impl AsRef<str>, credential: Option<&Credential>) -> Self {
        ProviderError::Decode(mask_with(message.as_ref(), credential))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Retryable for ProviderError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            ProviderError::Timeout(_) | ProviderError::Connect(_) => RetryDecision::Retry,
            ProviderError::Status { status, .. } => StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(RetryDecision::NoRetry),
            ProviderError::Request(_) | ProviderError::Decode(_) => RetryDecision::NoRetry,
        }
    }
}

/// Turn a response into its body text, or a classified error for
/// non-success statuses.
///
/// # Errors
/// [`ProviderError::Status`] for non-2xx responses, or the transport error
/// if the body cannot be read.
pub async fn read_body(
    response: reqwest::Response,
    credential: Option<&Credential>,
) -> Result<String, ProviderError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, credential))?;

    if status.is_success() {
        Ok(text)
    } else {
        Err(ProviderError::from_status(status, &text, credential))
    }
}
