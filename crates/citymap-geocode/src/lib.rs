//! City geocoding for CityMap.
//!
//! Resolves place names to coordinates through a persistent, negatively
//! caching coordinate cache backed by Nominatim or Bing Maps.

pub mod batch;
pub mod bing;
pub mod cache;
pub mod error;
pub mod nominatim;
pub mod provider;
pub mod resolver;
pub mod types;

pub use batch::{resolve_many_concurrent, CityRow, CityTable};
pub use bing::BingGeocoder;
pub use cache::{CachedLookup, CoordinateCache, ExportFormat};
pub use error::{CacheError, GeocodeError};
pub use nominatim::NominatimGeocoder;
pub use provider::{Geocoder, ProviderRegistry};
pub use resolver::GeocodeResolver;
pub use types::{CacheEntry, Coordinates, ProviderSelector};
