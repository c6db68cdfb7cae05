//! Weather service for CityMap
//!
//! Current temperature and air quality for resolved city coordinates,
//! via the OpenWeather API.

pub mod provider;
pub mod types;

pub use provider::WeatherProvider;
pub use types::*;
