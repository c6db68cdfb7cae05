//! Points of interest around a city, via OpenTripMap.

pub mod client;
pub mod types;

pub use client::PoiClient;
pub use types::{PoiError, PoiQuery, PointOfInterest, DEFAULT_LIMIT, DEFAULT_RADIUS_METERS};
