use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GeocodeError;

/// A resolved latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when both values are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Cached result of a lookup. Both fields absent means the lookup was
/// attempted and found nothing (a negative entry).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheEntry {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CacheEntry {
    pub fn found(coords: Coordinates) -> Self {
        Self {
            latitude: Some(coords.latitude),
            longitude: Some(coords.longitude),
        }
    }

    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn is_negative(&self) -> bool {
        self.coordinates().is_none()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }
}

impl From<Option<Coordinates>> for CacheEntry {
    fn from(coords: Option<Coordinates>) -> Self {
        coords.map(CacheEntry::found).unwrap_or_default()
    }
}

/// Which geocoding backend serves a cache miss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSelector {
    /// Nominatim (OpenStreetMap), no key required
    #[default]
    Primary,
    /// Bing Maps, requires an API key
    Secondary,
}

impl ProviderSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for ProviderSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderSelector {
    type Err = GeocodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "nominatim" => Ok(Self::Primary),
            "secondary" | "bing" => Ok(Self::Secondary),
            _ => Err(GeocodeError::InvalidProvider(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_entry_found_and_negative() {
        let entry = CacheEntry::found(Coordinates::new(50.0614, 19.9366));
        assert!(!entry.is_negative());
        assert_eq!(entry.coordinates(), Some(Coordinates::new(50.0614, 19.9366)));

        let negative = CacheEntry::not_found();
        assert!(negative.is_negative());
        assert_eq!(negative.latitude, None);
        assert_eq!(negative.longitude, None);
    }

    #[test]
    fn test_half_present_entry_is_negative() {
        let entry = CacheEntry {
            latitude: Some(1.0),
            longitude: None,
        };
        assert!(entry.is_negative());
    }

    #[test]
    fn test_provider_selector_parsing() {
        assert_eq!("primary".parse::<ProviderSelector>().unwrap(), ProviderSelector::Primary);
        assert_eq!("Nominatim".parse::<ProviderSelector>().unwrap(), ProviderSelector::Primary);
        assert_eq!(" BING ".parse::<ProviderSelector>().unwrap(), ProviderSelector::Secondary);
        assert_eq!("secondary".parse::<ProviderSelector>().unwrap(), ProviderSelector::Secondary);
    }

    #[test]
    fn test_unknown_provider_selector() {
        let err = "google".parse::<ProviderSelector>().unwrap_err();
        assert!(matches!(err, GeocodeError::InvalidProvider(ref s) if s == "google"));
    }

    #[test]
    fn test_coordinates_bounds() {
        assert!(Coordinates::new(50.0, 19.9).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, f64::NAN).is_valid());
    }
}
