//! Shared plumbing for outbound provider calls: retry policy, error
//! classification and credential masking.

pub mod error;
pub mod redact;
pub mod retry;

pub use error::{read_body, ProviderError};
pub use redact::{mask_with, Credential};
pub use retry::{with_retry, RetryConfig, RetryDecision, Retryable};
