use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use citymap_geocode::Coordinates;
use citymap_services::ProviderError;

pub const DEFAULT_RADIUS_METERS: u32 = 2000;
pub const DEFAULT_LIMIT: u32 = 25;

/// A named place near a city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub name: String,
    pub coords: Coordinates,
    /// Comma-separated OpenTripMap categories, e.g. "museums,cultural"
    pub kinds: String,
}

impl PointOfInterest {
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.split(',').map(str::trim).filter(|k| !k.is_empty())
    }
}

/// Search options for the radius query.
/// See: https://dev.opentripmap.org/docs#/Objects%20list/getListOfPlacesByRadius
#[derive(Debug, Clone, PartialEq)]
pub struct PoiQuery {
    /// Search radius in meters
    pub radius: u32,
    /// Maximum number of results
    pub limit: u32,
    /// Category filter, e.g. "museums" or "interesting_places"
    pub kinds: Option<String>,
    /// Any other API parameter (rate, name, src_attr, ...). Overrides the fields above.
    pub extra: BTreeMap<String, String>,
}

impl Default for PoiQuery {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS_METERS,
            limit: DEFAULT_LIMIT,
            kinds: None,
            extra: BTreeMap::new(),
        }
    }
}

impl PoiQuery {
    pub fn with_kinds(mut self, kinds: impl Into<String>) -> Self {
        self.kinds = Some(kinds.into());
        self
    }

    pub fn with_radius(mut self, radius: u32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Query parameters for a search around `coords`, without the API key.
    /// `apikey` cannot be set through `extra`.
    pub fn params(&self, coords: Coordinates) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("lat".to_string(), coords.latitude.to_string());
        params.insert("lon".to_string(), coords.longitude.to_string());
        params.insert("radius".to_string(), self.radius.to_string());
        params.insert("limit".to_string(), self.limit.to_string());
        if let Some(kinds) = &self.kinds {
            params.insert("kinds".to_string(), kinds.clone());
        }
        for (k, v) in &self.extra {
            if k != "apikey" {
                params.insert(k.clone(), v.clone());
            }
        }
        params
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoiError {
    #[error("Failed to get points of interest: {0}")]
    Provider(#[from] ProviderError),
}
