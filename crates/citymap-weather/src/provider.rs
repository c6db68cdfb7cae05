//! OpenWeather client: current temperature and air pollution.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::instrument;

use citymap_geocode::Coordinates;
use citymap_services::{read_body, with_retry, Credential, ProviderError, RetryConfig};

use crate::types::{AirQuality, AirQualityReport, WeatherError};

pub const OPENWEATHER_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    main: MainBlock,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct AirPollutionResponse {
    #[serde(default)]
    list: Vec<AirPollutionItem>,
}

#[derive(Debug, Deserialize)]
struct AirPollutionItem {
    main: AqiBlock,
    #[serde(default)]
    components: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct AqiBlock {
    aqi: u8,
}

#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Client,
    api_key: Credential,
    base_url: String,
    retry: RetryConfig,
}

impl WeatherProvider {
    /// # Errors
    /// [`WeatherError::Request`] if the HTTP client cannot be built.
    pub fn new(api_key: Credential, retry: RetryConfig, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Request(ProviderError::Request(api_key.mask(&e.to_string()))))?;

        Ok(Self {
            client,
            api_key,
            base_url: OPENWEATHER_URL.to_string(),
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Current temperature in °C, or `None` when it cannot be fetched.
    #[instrument(skip(self), level = "info")]
    pub async fn get_temperature(&self, coords: Coordinates) -> Option<f64> {
        let result: Result<CurrentWeatherResponse, WeatherError> = self
            .fetch_json("/data/2.5/weather", coords, &[("units", "metric")])
            .await;

        match result {
            Ok(body) => Some(body.main.temp),
            Err(e) => {
                tracing::warn!("{}", e.failure_message("temperature"));
                None
            }
        }
    }

    /// Air quality category and component breakdown.
    ///
    /// # Errors
    /// [`WeatherError`] whose text is safe to show; see
    /// [`WeatherError::failure_message`].
    #[instrument(skip(self), level = "info")]
    pub async fn get_air_quality(&self, coords: Coordinates) -> Result<AirQualityReport, WeatherError> {
        let body: AirPollutionResponse = self
            .fetch_json("/data/2.5/air_pollution", coords, &[])
            .await?;

        let item = body.list.into_iter().next().ok_or(WeatherError::Empty)?;
        let category = AirQuality::from_aqi(item.main.aqi).ok_or(WeatherError::UnknownAqi(item.main.aqi))?;

        Ok(AirQualityReport {
            category,
            components: item.components,
        })
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        coords: Coordinates,
        extra: &[(&str, &str)],
    ) -> Result<T, WeatherError> {
        let key = Some(&self.api_key);
        let url = format!("{}{}", self.base_url, endpoint);
        let (lat, lon) = (coords.latitude.to_string(), coords.longitude.to_string());
        let (url, lat, lon) = (url.as_str(), lat.as_str(), lon.as_str());
        let client = &self.client;

        let body = with_retry(&self.retry, move || async move {
            let response = client
                .get(url)
                .query(&[("lat", lat), ("lon", lon)])
                .query(extra)
                .query(&[("appid", self.api_key.expose())])
                .send()
                .await
                .map_err(|e| ProviderError::from_reqwest(e, key))?;
            read_body(response, key).await
        })
        .await?;

        serde_json::from_str(&body)
            .map_err(|e| WeatherError::Request(ProviderError::decode(format!("{}: {}", endpoint, e), key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "ow-secret";

    fn provider(server: &MockServer) -> WeatherProvider {
        WeatherProvider::new(
            Credential::new(KEY),
            RetryConfig::with_max_attempts(2, 1, 1),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(server.uri())
    }

    fn krakow() -> Coordinates {
        Coordinates::new(50.0614, 19.9366)
    }

    #[tokio::test]
    async fn test_get_temperature() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("lat", "50.0614"))
            .and(query_param("lon", "19.9366"))
            .and(query_param("units", "metric"))
            .and(query_param("appid", KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "main": {"temp": 12.5, "humidity": 70}
            })))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).get_temperature(krakow()).await, Some(12.5));
    }

    #[tokio::test]
    async fn test_temperature_unknown_on_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        assert_eq!(provider(&server).get_temperature(krakow()).await, None);
    }

    #[tokio::test]
    async fn test_get_air_quality() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "coord": {"lon": 19.9366, "lat": 50.0614},
                "list": [{
                    "main": {"aqi": 3},
                    "components": {"co": 201.94, "no2": 0.77, "pm2_5": 0.5, "pm10": 0.54},
                    "dt": 1605182400
                }]
            })))
            .mount(&server)
            .await;

        let report = provider(&server).get_air_quality(krakow()).await.unwrap();
        assert_eq!(report.category, AirQuality::Moderate);
        assert_eq!(report.components.get("co"), Some(&201.94));
        assert_eq!(report.components.len(), 4);
    }

    #[tokio::test]
    async fn test_air_quality_error_masks_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "cod": 401,
                "message": format!("Invalid API key {}. Please see the FAQ.", KEY)
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(&server).get_air_quality(krakow()).await.unwrap_err();
        let message = err.failure_message("air quality");
        assert!(matches!(err, WeatherError::Request(_)));
        assert!(message.starts_with("Failed to get air quality. Request error"));
        assert!(!message.contains(KEY));
    }

    #[tokio::test]
    async fn test_exhausted_server_errors_keep_status_text() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(2)
            .mount(&server)
            .await;

        let err = provider(&server).get_air_quality(krakow()).await.unwrap_err();
        assert!(matches!(err, WeatherError::Request(ProviderError::Status { status: 503, .. })));
        assert!(!err.failure_message("air quality").contains("retries limit"));
    }

    #[tokio::test]
    async fn test_unknown_aqi_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "list": [{"main": {"aqi": 9}, "components": {}}]
            })))
            .mount(&server)
            .await;

        let err = provider(&server).get_air_quality(krakow()).await.unwrap_err();
        assert!(matches!(err, WeatherError::UnknownAqi(9)));
    }

    #[tokio::test]
    async fn test_empty_list() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/air_pollution"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"list": []})))
            .mount(&server)
            .await;

        let err = provider(&server).get_air_quality(krakow()).await.unwrap_err();
        assert!(matches!(err, WeatherError::Empty));
    }
}
