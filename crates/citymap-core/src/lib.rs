pub mod config;
pub mod error;

pub use config::{
    ApiKeys, Config, GeocodingConfig, PoiConfig, RetrySettings, ValidationResult, WeatherConfig,
};
pub use error::{AppError, ConfigError};

use anyhow::Result;

/// Initialize logging and load a `.env` file if one exists.
///
/// # Errors
/// Fails if a global tracing subscriber is already installed.
pub fn init() -> Result<()> {
    // Missing .env is normal; credentials may come from the real environment
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    tracing::info!("CityMap core initialized");
    Ok(())
}
