//! OpenTripMap places-by-radius client.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use citymap_geocode::Coordinates;
use citymap_services::{read_body, with_retry, Credential, ProviderError, RetryConfig};

use crate::types::{PoiError, PoiQuery, PointOfInterest};

pub const OPENTRIPMAP_URL: &str = "https://api.opentripmap.com";

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// GeoJSON order: `[longitude, latitude]`
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    name: String,
    #[serde(default)]
    kinds: String,
}

#[derive(Debug, Clone)]
pub struct PoiClient {
    client: Client,
    api_key: Credential,
    base_url: String,
    retry: RetryConfig,
}

impl PoiClient {
    /// # Errors
    /// [`PoiError::Provider`] if the HTTP client cannot be built.
    pub fn new(api_key: Credential, retry: RetryConfig, timeout: Duration) -> Result<Self, PoiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(api_key.mask(&e.to_string())))?;

        Ok(Self {
            client,
            api_key,
            base_url: OPENTRIPMAP_URL.to_string(),
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Places around `coords`, in API order, skipping entries without a name.
    ///
    /// # Errors
    /// [`PoiError::Provider`] with masked text when the request fails after
    /// retries or the response cannot be decoded.
    #[instrument(skip(self), level = "info")]
    pub async fn get_points_of_interest(
        &self,
        coords: Coordinates,
        query: &PoiQuery,
    ) -> Result<Vec<PointOfInterest>, PoiError> {
        let key = Some(&self.api_key);
        let url = format!("{}/0.1/en/places/radius", self.base_url);
        let params = query.params(coords);
        let (url, params, client) = (url.as_str(), &params, &self.client);

        let body = with_retry(&self.retry, move || async move {
            let response = client
                .get(url)
                .query(params)
                .query(&[("apikey", self.api_key.expose())])
                .send()
                .await
                .map_err(|e| ProviderError::from_reqwest(e, key))?;
            read_body(response, key).await
        })
        .await
        .map_err(|e| {
            tracing::warn!("OpenTripMap request failed: {}", e);
            e
        })?;

        let collection: FeatureCollection = serde_json::from_str(&body)
            .map_err(|e| ProviderError::decode(format!("OpenTripMap places: {}", e), key))?;

        let places: Vec<PointOfInterest> = collection
            .features
            .into_iter()
            .filter(|f| !f.properties.name.is_empty())
            .filter_map(|f| match f.geometry.coordinates.as_slice() {
                [lon, lat, ..] => Some(PointOfInterest {
                    name: f.properties.name,
                    coords: Coordinates::new(*lat, *lon),
                    kinds: f.properties.kinds,
                }),
                _ => {
                    tracing::debug!("Skipping '{}' without coordinates", f.properties.name);
                    None
                }
            })
            .collect();

        tracing::info!("Found {} points of interest near {}", places.len(), coords);
        Ok(places)
    }
}
