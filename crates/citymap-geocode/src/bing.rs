//! Forward geocoding via the Bing Maps Locations API (requires an API key).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use citymap_services::{read_body, Credential, ProviderError};

use crate::provider::Geocoder;
use crate::types::Coordinates;

pub const BING_MAPS_URL: &str = "https://dev.virtualearth.net";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationsResponse {
    #[serde(default)]
    resource_sets: Vec<ResourceSet>,
}

#[derive(Debug, Deserialize)]
struct ResourceSet {
    #[serde(default)]
    resources: Vec<LocationResource>,
}

#[derive(Debug, Deserialize)]
struct LocationResource {
    #[serde(default)]
    name: Option<String>,
    point: Point,
}

#[derive(Debug, Deserialize)]
struct Point {
    /// `[latitude, longitude]`
    coordinates: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct BingGeocoder {
    client: Client,
    api_key: Credential,
    base_url: String,
}

impl BingGeocoder {
    /// # Errors
    /// [`ProviderError::Request`] if the HTTP client cannot be built.
    pub fn new(api_key: Credential, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(api_key.mask(&e.to_string())))?;

        Ok(Self {
            client,
            api_key,
            base_url: BING_MAPS_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Geocoder for BingGeocoder {
    fn name(&self) -> &'static str {
        "bing"
    }

    #[instrument(skip(self), level = "debug")]
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, ProviderError> {
        let key = Some(&self.api_key);
        let url = format!("{}/REST/v1/Locations", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("maxResults", "1"),
                ("key", self.api_key.expose()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, key))?;

        let body = read_body(response, key).await?;
        let parsed: LocationsResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::decode(format!("Bing locations: {}", e), key))?;

        let Some(resource) = parsed
            .resource_sets
            .into_iter()
            .flat_map(|set| set.resources)
            .next()
        else {
            tracing::debug!("Bing found no match for '{}'", query);
            return Ok(None);
        };

        let coords = match resource.point.coordinates.as_slice() {
            [lat, lon, ..] => Coordinates::new(*lat, *lon),
            other => {
                return Err(ProviderError::decode(
                    format!("Bing point has {} coordinates, expected 2", other.len()),
                    key,
                ))
            }
        };
        if !coords.is_valid() {
            return Err(ProviderError::decode(
                format!(
                    "Bing returned out-of-range coordinates ({}, {})",
                    coords.latitude, coords.longitude
                ),
                key,
            ));
        }

        tracing::info!(
            "Geocoded '{}' to {} ({})",
            query,
            coords,
            resource.name.as_deref().unwrap_or("unnamed")
        );
        Ok(Some(coords))
    }
}
