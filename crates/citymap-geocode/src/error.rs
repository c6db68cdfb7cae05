//! Geocoding error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that reach callers of the resolver.
///
/// Provider failures (timeouts, bad responses, no match) never show up here;
/// they are recorded as negative cache entries instead.
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Invalid geocoding provider: {0}")]
    InvalidProvider(String),

    #[error("Coordinate cache error: {0}")]
    Cache(#[from] CacheError),
}

impl GeocodeError {
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidProvider(name) => format!(
                "Unknown or unconfigured geocoding provider '{}'. Use primary or secondary.",
                name
            ),
            Self::Cache(_) => "Could not save the coordinate cache. Check disk space and permissions."
                .to_string(),
        }
    }
}

/// Persistence failures of the coordinate cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to export cache: {0}")]
    Export(String),
}

impl From<csv::Error> for CacheError {
    fn from(e: csv::Error) -> Self {
        CacheError::Export(e.to_string())
    }
}
