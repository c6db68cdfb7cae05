use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use citymap_services::ProviderError;

/// OpenWeather air quality index categories
/// See: https://openweathermap.org/api/air-pollution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirQuality {
    Good,
    Fair,
    Moderate,
    Poor,
    VeryPoor,
}

impl AirQuality {
    /// Convert the 1-5 AQI value; anything else is rejected.
    pub fn from_aqi(aqi: u8) -> Option<Self> {
        match aqi {
            1 => Some(Self::Good),
            2 => Some(Self::Fair),
            3 => Some(Self::Moderate),
            4 => Some(Self::Poor),
            5 => Some(Self::VeryPoor),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Moderate => "Moderate",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very poor",
        }
    }
}

impl std::fmt::Display for AirQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Air quality category plus pollutant concentrations (μg/m³),
/// keyed by OpenWeather component name (co, no, no2, o3, so2, pm2_5, pm10, nh3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityReport {
    pub category: AirQuality,
    pub components: BTreeMap<String, f64>,
}

/// Weather provider errors. Text is already masked.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Request timed out and reached its retries limit: {0}")]
    RetriesExhausted(ProviderError),

    #[error("Request error {0}")]
    Request(ProviderError),

    #[error("Unexpected air quality index {0}")]
    UnknownAqi(u8),

    #[error("Response contained no data")]
    Empty,
}

impl From<ProviderError> for WeatherError {
    /// Only a timeout that survived every retry gets the "retries limit"
    /// wording; other failures keep their own text.
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Timeout(_) => WeatherError::RetriesExhausted(e),
            other => WeatherError::Request(other),
        }
    }
}

impl WeatherError {
    /// Failure message in the form shown on the dashboard.
    pub fn failure_message(&self, what: &str) -> String {
        format!("Failed to get {}. {}", what, self)
    }
}
