use std::path::PathBuf;
use std::sync::Arc;

use citymap_core::{AppError, Config};
use citymap_geocode::{
    resolve_many_concurrent, BingGeocoder, CityTable, Coordinates, CoordinateCache, ExportFormat,
    GeocodeResolver, NominatimGeocoder, ProviderRegistry, ProviderSelector,
};
use citymap_poi::{PoiClient, PoiQuery, PointOfInterest};
use citymap_weather::{AirQualityReport, WeatherError, WeatherProvider};

/// Current conditions for one city
#[derive(Debug)]
pub struct CityWeather {
    pub coords: Coordinates,
    pub temperature: Option<f64>,
    pub air_quality: Result<AirQualityReport, WeatherError>,
}

/// Wires configuration into the cache, resolver and collaborator clients.
pub struct App {
    config: Config,
    resolver: Arc<GeocodeResolver>,
    weather: Option<WeatherProvider>,
    poi: Option<PoiClient>,
}

impl App {
    /// # Errors
    /// [`AppError::Service`] if an HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let timeout = config.retry.request_timeout();
        let retry = config.retry.retry_config();
        let keys = &config.api_keys;

        let nominatim = NominatimGeocoder::new(&config.geocoding.user_agent, timeout)
            .map_err(|e| AppError::service("Geocoding", e))?
            .with_base_url(&config.geocoding.nominatim_url);
        let mut providers =
            ProviderRegistry::new().with(ProviderSelector::Primary, Arc::new(nominatim));

        match &keys.bing {
            Some(key) => {
                let bing = BingGeocoder::new(key.clone(), timeout)
                    .map_err(|e| AppError::service("Geocoding", e))?
                    .with_base_url(&config.geocoding.bing_url);
                providers.register(ProviderSelector::Secondary, Arc::new(bing));
            }
            None => tracing::debug!("No Bing key, secondary provider disabled"),
        }

        let cache_path = config.cache_path();
        tracing::info!("Using coordinate cache at {}", cache_path.display());
        let cache = Arc::new(CoordinateCache::load(cache_path));

        let resolver = GeocodeResolver::new(cache, providers, retry.clone())
            .with_negative_ttl(config.geocoding.negative_ttl());

        let weather = match &keys.openweather {
            Some(key) => Some(
                WeatherProvider::new(key.clone(), retry.clone(), timeout)
                    .map_err(|e| AppError::service("Weather", e))?
                    .with_base_url(&config.weather.base_url),
            ),
            None => None,
        };

        let poi = match &keys.opentripmap {
            Some(key) => Some(
                PoiClient::new(key.clone(), retry, timeout)
                    .map_err(|e| AppError::service("POI", e))?
                    .with_base_url(&config.poi.base_url),
            ),
            None => None,
        };

        Ok(Self {
            config,
            resolver: Arc::new(resolver),
            weather,
            poi,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Provider from the command line, falling back to the configured default.
    ///
    /// # Errors
    /// [`AppError::Service`] for an unknown provider name.
    pub fn provider(&self, requested: Option<&str>) -> Result<ProviderSelector, AppError> {
        requested
            .unwrap_or(&self.config.geocoding.default_provider)
            .parse()
            .map_err(|e| AppError::service("Geocoding", e))
    }

    /// # Errors
    /// Invalid provider or a cache write failure.
    pub async fn resolve(
        &self,
        names: Vec<String>,
        provider: ProviderSelector,
        concurrency: usize,
    ) -> Result<CityTable, AppError> {
        let table = if concurrency > 1 {
            resolve_many_concurrent(Arc::clone(&self.resolver), names, provider, concurrency).await
        } else {
            self.resolver.resolve_many(names.as_slice(), provider).await
        };
        table.map_err(|e| AppError::service("Geocoding", e))
    }

    /// Coordinates for a single city. A cached "not found" is an error here.
    ///
    /// # Errors
    /// Invalid provider, cache write failure, or no match for `city`.
    pub async fn locate(&self, city: &str, provider: ProviderSelector) -> Result<Coordinates, AppError> {
        let entry = self
            .resolver
            .resolve(city, provider)
            .await
            .map_err(|e| AppError::service("Geocoding", e))?;

        entry
            .coordinates()
            .ok_or_else(|| AppError::service("Geocoding", format!("No coordinates found for '{}'", city)))
    }

    /// Write the cache to `output`, or `dump.<ext>` in the working directory.
    ///
    /// # Errors
    /// [`AppError::Service`] if the export file cannot be written.
    pub fn export(&self, format: ExportFormat, output: Option<PathBuf>) -> Result<(PathBuf, usize), AppError> {
        let path = output.unwrap_or_else(|| PathBuf::from(format.default_file_name()));
        let count = self
            .resolver
            .cache()
            .export(format, &path)
            .map_err(|e| AppError::service("Cache", e))?;
        Ok((path, count))
    }

    /// # Errors
    /// [`AppError::Service`] if the cache cannot be persisted.
    pub fn forget(&self, name: &str) -> Result<bool, AppError> {
        self.resolver
            .cache()
            .remove(name)
            .map_err(|e| AppError::service("Cache", e))
    }

    /// Drop cached entries and return how many were removed.
    ///
    /// # Errors
    /// [`AppError::Service`] if the cache cannot be persisted.
    pub fn clear(&self, negative_only: bool) -> Result<usize, AppError> {
        let cache = self.resolver.cache();
        if negative_only {
            return cache.clear_negative().map_err(|e| AppError::service("Cache", e));
        }
        let removed = cache.len();
        cache.clear().map_err(|e| AppError::service("Cache", e))?;
        Ok(removed)
    }

    /// # Errors
    /// Missing OpenWeather key or the city cannot be located.
    pub async fn weather(&self, city: &str, provider: ProviderSelector) -> Result<CityWeather, AppError> {
        let client = self
            .weather
            .as_ref()
            .ok_or(AppError::MissingCredential(citymap_core::config::OPENWEATHER_API_KEY_VAR))?;
        let coords = self.locate(city, provider).await?;

        let (temperature, air_quality) =
            tokio::join!(client.get_temperature(coords), client.get_air_quality(coords));

        Ok(CityWeather {
            coords,
            temperature,
            air_quality,
        })
    }

    /// Search defaults come from the `poi` config section unless `query` overrides them.
    ///
    /// # Errors
    /// Missing OpenTripMap key, the city cannot be located, or the request fails.
    pub async fn points_of_interest(
        &self,
        city: &str,
        provider: ProviderSelector,
        query: PoiQuery,
    ) -> Result<Vec<PointOfInterest>, AppError> {
        let client = self
            .poi
            .as_ref()
            .ok_or(AppError::MissingCredential(citymap_core::config::OPENTRIPMAP_API_KEY_VAR))?;
        let coords = self.locate(city, provider).await?;

        client
            .get_points_of_interest(coords, &query)
            .await
            .map_err(|e| AppError::service("POI", e))
    }

    /// Default search options from config
    pub fn poi_query(&self) -> PoiQuery {
        PoiQuery::default()
            .with_radius(self.config.poi.radius)
            .with_limit(self.config.poi.limit)
    }
}
