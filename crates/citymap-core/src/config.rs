use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use citymap_services::{Credential, RetryConfig};

use crate::error::ConfigError;

/// Environment variables holding provider credentials.
pub const BING_API_KEY_VAR: &str = "BING_API_KEY";
pub const OPENWEATHER_API_KEY_VAR: &str = "OPENWEATHER_API_KEY";
pub const OPENTRIPMAP_API_KEY_VAR: &str = "OPENTRIPMAP_API_KEY";

/// Provider names accepted in `geocoding.default_provider`.
const KNOWN_PROVIDERS: &[&str] = &["primary", "nominatim", "secondary", "bing"];

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the coordinate cache and exports
    pub data_dir: PathBuf,

    #[serde(default)]
    pub geocoding: GeocodingConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub poi: PoiConfig,

    /// Provider credentials, read from the environment only
    #[serde(skip)]
    pub api_keys: ApiKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Provider used when none is given: "primary" (Nominatim) or "secondary" (Bing)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Cache file name, relative to `data_dir` unless absolute
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Re-query "not found" entries older than this. Unset keeps them forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_ttl_hours: Option<u64>,

    /// User-Agent sent to Nominatim (its usage policy requires one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,

    #[serde(default = "default_bing_url")]
    pub bing_url: String,
}

fn default_provider() -> String {
    "primary".to_string()
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("geocode_cache.json")
}

fn default_user_agent() -> String {
    format!("citymap/{}", env!("CARGO_PKG_VERSION"))
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_bing_url() -> String {
    "https://dev.virtualearth.net".to_string()
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            cache_file: default_cache_file(),
            negative_ttl_hours: None,
            user_agent: default_user_agent(),
            nominatim_url: default_nominatim_url(),
            bing_url: default_bing_url(),
        }
    }
}

impl GeocodingConfig {
    pub fn negative_ttl(&self) -> Option<Duration> {
        self.negative_ttl_hours
            .map(|h| Duration::from_secs(h.saturating_mul(3600)))
    }
}

/// Retry policy shared by every provider client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    citymap_services::retry::DEFAULT_MAX_RETRIES
}

fn default_initial_delay_ms() -> u64 {
    citymap_services::retry::DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    citymap_services::retry::DEFAULT_MAX_DELAY_MS
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RetrySettings {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, self.initial_delay_ms, self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_openweather_url")]
    pub base_url: String,
}

fn default_openweather_url() -> String {
    "https://api.openweathermap.org".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_openweather_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoiConfig {
    #[serde(default = "default_opentripmap_url")]
    pub base_url: String,
    /// Search radius in meters
    #[serde(default = "default_poi_radius")]
    pub radius: u32,
    /// Maximum number of places returned
    #[serde(default = "default_poi_limit")]
    pub limit: u32,
}

fn default_opentripmap_url() -> String {
    "https://api.opentripmap.com".to_string()
}

fn default_poi_radius() -> u32 {
    2000
}

fn default_poi_limit() -> u32 {
    25
}

impl Default for PoiConfig {
    fn default() -> Self {
        Self {
            base_url: default_opentripmap_url(),
            radius: default_poi_radius(),
            limit: default_poi_limit(),
        }
    }
}

/// Provider credentials. `Debug` output is masked by [`Credential`].
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub bing: Option<Credential>,
    pub openweather: Option<Credential>,
    pub opentripmap: Option<Credential>,
}

impl ApiKeys {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        Self {
            bing: Credential::from_env(BING_API_KEY_VAR),
            openweather: Credential::from_env(OPENWEATHER_API_KEY_VAR),
            opentripmap: Credential::from_env(OPENTRIPMAP_API_KEY_VAR),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("citymap");

        Self {
            data_dir,
            geocoding: GeocodingConfig::default(),
            retry: RetrySettings::default(),
            weather: WeatherConfig::default(),
            poi: PoiConfig::default(),
            api_keys: ApiKeys::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, parsed or created.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there first if missing.
    /// Credentials are always taken from the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, parsed or created.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::NotFound(format!("{}: {}", path.display(), e)))?;
            toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            config
        };

        config.api_keys = ApiKeys::from_env();
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    ///
    /// # Errors
    /// Fails if loading fails or validation reports errors.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult), ConfigError> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        let provider = self.geocoding.default_provider.to_lowercase();
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            result.add_error(
                "geocoding.default_provider",
                format!(
                    "Unknown provider '{}', expected one of: {}",
                    self.geocoding.default_provider,
                    KNOWN_PROVIDERS.join(", ")
                ),
            );
        }

        if self.geocoding.cache_file.as_os_str().is_empty() {
            result.add_error("geocoding.cache_file", "Cache file name must not be empty");
        }

        if self.geocoding.negative_ttl_hours == Some(0) {
            result.add_warning(
                "geocoding.negative_ttl_hours",
                "A TTL of 0 re-queries every failed lookup",
            );
        }

        if self.geocoding.user_agent.trim().is_empty() {
            result.add_error("geocoding.user_agent", "Nominatim requires a User-Agent");
        }

        Self::validate_url(&self.geocoding.nominatim_url, "geocoding.nominatim_url", &mut result);
        Self::validate_url(&self.geocoding.bing_url, "geocoding.bing_url", &mut result);
        Self::validate_url(&self.weather.base_url, "weather.base_url", &mut result);
        Self::validate_url(&self.poi.base_url, "poi.base_url", &mut result);

        if self.retry.request_timeout_secs == 0 {
            result.add_error("retry.request_timeout_secs", "Timeout must be greater than 0");
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            result.add_warning(
                "retry.initial_delay_ms",
                "Initial delay exceeds max delay; every retry waits max_delay_ms",
            );
        }

        if self.poi.limit == 0 {
            result.add_error("poi.limit", "Limit must be greater than 0");
        }
        if self.poi.radius == 0 {
            result.add_error("poi.radius", "Radius must be greater than 0");
        }

        if self.api_keys.bing.is_none() {
            result.add_warning(
                "api_keys.bing",
                format!("{} not set - secondary geocoder unavailable", BING_API_KEY_VAR),
            );
        }
        if self.api_keys.openweather.is_none() {
            result.add_warning(
                "api_keys.openweather",
                format!("{} not set - weather unavailable", OPENWEATHER_API_KEY_VAR),
            );
        }
        if self.api_keys.opentripmap.is_none() {
            result.add_warning(
                "api_keys.opentripmap",
                format!("{} not set - points of interest unavailable", OPENTRIPMAP_API_KEY_VAR),
            );
        }

        result
    }

    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }
                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Absolute path of the coordinate cache file
    pub fn cache_path(&self) -> PathBuf {
        if self.geocoding.cache_file.is_absolute() {
            self.geocoding.cache_file.clone()
        } else {
            self.data_dir.join(&self.geocoding.cache_file)
        }
    }

    /// Save configuration to `path`
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Invalid(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Invalid(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get the path to the default configuration file
    ///
    /// # Errors
    /// Fails when the platform has no configuration directory.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("platform config directory".to_string()))?
            .join("citymap");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_keys(mut config: Config) -> Config {
        config.api_keys = ApiKeys {
            bing: Some(Credential::new("b")),
            openweather: Some(Credential::new("o")),
            opentripmap: Some(Credential::new("t")),
        };
        config
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_unknown_provider_is_error() {
        let mut config = Config::default();
        config.geocoding.default_provider = "google".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "geocoding.default_provider"));
    }

    #[test]
    fn test_provider_names_case_insensitive() {
        let mut config = Config::default();
        config.geocoding.default_provider = "Bing".to_string();
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.weather.base_url = "ftp://localhost:8080".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_missing_keys_are_warnings() {
        let result = Config::default().validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "api_keys.bing"));

        let result = with_keys(Config::default()).validate();
        assert!(result.warnings.iter().all(|w| !w.field.starts_with("api_keys")));
    }

    #[test]
    fn test_zero_poi_limit() {
        let mut config = Config::default();
        config.poi.limit = 0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "poi.limit"));
    }

    #[test]
    fn test_cache_path_relative_and_absolute() {
        let mut config = Config::default();
        config.data_dir = PathBuf::from("/var/lib/citymap");
        assert_eq!(
            config.cache_path(),
            PathBuf::from("/var/lib/citymap/geocode_cache.json")
        );

        config.geocoding.cache_file = PathBuf::from("/tmp/other.json");
        assert_eq!(config.cache_path(), PathBuf::from("/tmp/other.json"));
    }

    #[test]
    fn test_negative_ttl() {
        let mut config = Config::default();
        assert_eq!(config.geocoding.negative_ttl(), None);
        config.geocoding.negative_ttl_hours = Some(2);
        assert_eq!(config.geocoding.negative_ttl(), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_load_from_creates_default_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.data_dir, created.data_dir);
        assert_eq!(reloaded.poi.radius, 2000);
        assert_eq!(reloaded.geocoding.default_provider, "primary");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "data_dir = \"/srv/citymap\"\n\n[geocoding]\nnegative_ttl_hours = 24\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/citymap"));
        assert_eq!(config.geocoding.negative_ttl_hours, Some(24));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.poi.limit, 25);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "data_dir = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_credentials_never_serialized() {
        let config = with_keys(Config::default());
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("api_keys"));
    }
}
