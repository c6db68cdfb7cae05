//! Place name → coordinates, cache first.
//!
//! A miss is sent to the selected provider through the retry policy and the
//! outcome is always written back: coordinates on success, a negative entry
//! when the provider found nothing, failed permanently or kept timing out.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use citymap_services::{with_retry, RetryConfig};

use crate::cache::CoordinateCache;
use crate::error::GeocodeError;
use crate::provider::ProviderRegistry;
use crate::types::{CacheEntry, ProviderSelector};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug)]
pub struct GeocodeResolver {
    cache: Arc<CoordinateCache>,
    providers: ProviderRegistry,
    retry: RetryConfig,
    negative_ttl: Option<Duration>,
    in_flight: Mutex<HashMap<String, KeyLock>>,
}

impl GeocodeResolver {
    pub fn new(cache: Arc<CoordinateCache>, providers: ProviderRegistry, retry: RetryConfig) -> Self {
        Self {
            cache,
            providers,
            retry,
            negative_ttl: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Re-query negative entries once they are older than `ttl`.
    /// Without a TTL they are kept until removed from the cache.
    pub fn with_negative_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.negative_ttl = ttl;
        self
    }

    pub fn cache(&self) -> &Arc<CoordinateCache> {
        &self.cache
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Resolve `name` with the given provider.
    ///
    /// Cache hits (including negative ones) return without any network call.
    /// Provider failures never surface: they are cached and returned as a
    /// negative entry.
    ///
    /// # Errors
    /// - [`GeocodeError::InvalidProvider`] on a miss with no backend for `provider`
    /// - [`GeocodeError::Cache`] if the result cannot be persisted
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(
        &self,
        name: &str,
        provider: ProviderSelector,
    ) -> Result<CacheEntry, GeocodeError> {
        if let Some(entry) = self.cached(name) {
            tracing::debug!("Cache hit for '{}'", name);
            return Ok(entry);
        }

        let geocoder = self.providers.get(provider)?;

        let lock = self.key_lock(name);
        let guard = lock.lock().await;

        // Another task may have resolved this name while we waited.
        let result = match self.cached(name) {
            Some(entry) => {
                tracing::debug!("'{}' resolved by a concurrent lookup", name);
                Ok(entry)
            }
            None => {
                tracing::debug!("Cache miss for '{}', asking {}", name, geocoder.name());
                let entry = match with_retry(&self.retry, || geocoder.geocode(name)).await {
                    Ok(Some(coords)) => CacheEntry::found(coords),
                    Ok(None) => {
                        tracing::info!("{} found no match for '{}'", geocoder.name(), name);
                        CacheEntry::not_found()
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Geocoding '{}' with {} failed: {}",
                            name,
                            geocoder.name(),
                            e
                        );
                        CacheEntry::not_found()
                    }
                };
                self.cache.put(name, entry).map(|_| entry).map_err(GeocodeError::from)
            }
        };

        drop(guard);
        self.release_key_lock(name, &lock);
        result
    }

    /// Like [`resolve`](Self::resolve) with the provider given by name
    /// (`primary`/`nominatim` or `secondary`/`bing`).
    ///
    /// # Errors
    /// See [`resolve`](Self::resolve). Unknown names fail with
    /// [`GeocodeError::InvalidProvider`].
    pub async fn resolve_named(&self, name: &str, provider: &str) -> Result<CacheEntry, GeocodeError> {
        let selector: ProviderSelector = provider.parse()?;
        self.resolve(name, selector).await
    }

    /// Cache lookup honouring the negative TTL.
    fn cached(&self, name: &str) -> Option<CacheEntry> {
        let hit = self.cache.lookup(name)?;

        if let (true, Some(ttl)) = (hit.entry.is_negative(), self.negative_ttl) {
            let age = Utc::now()
                .signed_duration_since(hit.cached_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age >= ttl {
                tracing::debug!("Negative entry for '{}' expired after {:?}", name, age);
                return None;
            }
        }

        Some(hit.entry)
    }

    fn key_lock(&self, name: &str) -> KeyLock {
        self.in_flight
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn release_key_lock(&self, name: &str, lock: &KeyLock) {
        let mut in_flight = self.in_flight.lock();
        // One reference in the map, one held by the caller: nobody else waits.
        if Arc::strong_count(lock) <= 2 {
            in_flight.remove(name);
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }
}
