//! Top-level error types for the CityMap binary.
//!
//! Domain crates (geocode, weather, poi) keep their own error enums; the
//! entry point folds them into [`AppError`] and shows `user_message()`.

use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors raised by a provider-backed service (geocoding, weather, POI).
    #[error("{service} error: {message}")]
    Service { service: &'static str, message: String },

    /// A feature needs a credential that is not configured.
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Wrap a service error, keeping its display text.
    pub fn service(service: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Service {
            service,
            message: err.to_string(),
        }
    }

    /// Returns a short, non-technical message for terminal output.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Service { .. } => "A provider request failed. Please try again.",
            AppError::MissingCredential(_) => {
                "An API key is missing. Set it in the environment or a .env file."
            }
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let err: AppError = ConfigError::Invalid("x".into()).into();
        assert!(matches!(err, AppError::Config(ConfigError::Invalid(_))));
        assert_eq!(err.user_message(), "Invalid configuration. Check your settings.");
    }

    #[test]
    fn test_service_error_keeps_text() {
        let err = AppError::service("Geocoding", "Invalid geocoding provider: google");
        assert_eq!(
            err.to_string(),
            "Geocoding error: Invalid geocoding provider: google"
        );
    }

    #[test]
    fn test_missing_credential_message() {
        let err = AppError::MissingCredential("OPENWEATHER_API_KEY");
        assert!(err.to_string().contains("OPENWEATHER_API_KEY"));
        assert!(err.user_message().contains("API key"));
    }
}
