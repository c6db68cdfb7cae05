//! Forward geocoding via Nominatim (OpenStreetMap) - free, no API key required.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use citymap_services::{read_body, ProviderError};

use crate::provider::Geocoder;
use crate::types::Coordinates;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    /// Nominatim's usage policy requires an identifying User-Agent.
    ///
    /// # Errors
    /// [`ProviderError::Request`] if the HTTP client cannot be built.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: NOMINATIM_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    #[instrument(skip(self), level = "debug")]
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, ProviderError> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, None))?;

        let body = read_body(response, None).await?;
        let places: Vec<NominatimPlace> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::decode(format!("Nominatim search: {}", e), None))?;

        let Some(place) = places.into_iter().next() else {
            tracing::debug!("Nominatim found no match for '{}'", query);
            return Ok(None);
        };

        let parse = |field: &str, value: &str| {
            value.trim().parse::<f64>().map_err(|e| {
                ProviderError::decode(format!("Nominatim {} '{}': {}", field, value, e), None)
            })
        };
        let coords = Coordinates::new(parse("lat", &place.lat)?, parse("lon", &place.lon)?);
        if !coords.is_valid() {
            return Err(ProviderError::decode(
                format!("Nominatim returned out-of-range coordinates ({}, {})", place.lat, place.lon),
                None,
            ));
        }

        tracing::info!(
            "Geocoded '{}' to {} ({})",
            query,
            coords,
            place.display_name.as_deref().unwrap_or("unnamed")
        );
        Ok(Some(coords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citymap_services::Retryable;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn geocoder(server: &MockServer) -> NominatimGeocoder {
        NominatimGeocoder::new("citymap-test/0.1", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_geocode_parses_string_coordinates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Kraków"))
            .and(query_param("format", "json"))
            .and(header("User-Agent", "citymap-test/0.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"lat": "50.0619474", "lon": "19.9368564", "display_name": "Kraków, Poland"}
            ])))
            .mount(&server)
            .await;

        let coords = geocoder(&server).geocode("Kraków").await.unwrap();
        assert_eq!(coords, Some(Coordinates::new(50.0619474, 19.9368564)));
    }

    #[tokio::test]
    async fn test_empty_result_is_no_match() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let coords = geocoder(&server).geocode("Atlantis").await.unwrap();
        assert_eq!(coords, None);
    }

    #[tokio::test]
    async fn test_service_unavailable_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = geocoder(&server).geocode("Kraków").await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_malformed_coordinates_are_not_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"lat": "north", "lon": "19.9"}
            ])))
            .mount(&server)
            .await;

        let err = geocoder(&server).geocode("Kraków").await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_non_finite_coordinates_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"lat": "NaN", "lon": "19.9"}
            ])))
            .mount(&server)
            .await;

        let err = geocoder(&server).geocode("Kraków").await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
        assert!(!err.is_transient());
    }
}
