//! Resolve lists of place names into a city table.
//!
//! The table always has one row per input name, in input order. Names that
//! could not be resolved keep their row with empty coordinates.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::GeocodeError;
use crate::resolver::GeocodeResolver;
use crate::types::{CacheEntry, Coordinates, ProviderSelector};

/// One row of the city table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRow {
    pub city: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl CityRow {
    pub fn new(city: impl Into<String>, entry: CacheEntry) -> Self {
        Self {
            city: city.into(),
            lat: entry.latitude,
            lon: entry.longitude,
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        CacheEntry {
            latitude: self.lat,
            longitude: self.lon,
        }
        .coordinates()
    }
}

/// Ordered city table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityTable {
    rows: Vec<CityRow>,
}

impl CityTable {
    pub fn rows(&self) -> &[CityRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CityRow> {
        self.rows.iter()
    }

    /// Rows that resolved to coordinates
    pub fn resolved(&self) -> impl Iterator<Item = &CityRow> {
        self.rows.iter().filter(|r| r.coordinates().is_some())
    }

    /// Name → entry pairs in input order. Duplicate names appear once per input.
    pub fn to_coordinate_map(&self) -> Vec<(String, CacheEntry)> {
        self.rows
            .iter()
            .map(|r| {
                (
                    r.city.clone(),
                    CacheEntry {
                        latitude: r.lat,
                        longitude: r.lon,
                    },
                )
            })
            .collect()
    }
}

impl FromIterator<CityRow> for CityTable {
    fn from_iter<I: IntoIterator<Item = CityRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CityTable {
    type Item = CityRow;
    type IntoIter = std::vec::IntoIter<CityRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl GeocodeResolver {
    /// Resolve `names` one after another.
    ///
    /// # Errors
    /// - [`GeocodeError::InvalidProvider`] before any lookup if `provider` has no backend
    /// - [`GeocodeError::Cache`] if a result cannot be persisted
    pub async fn resolve_many<S: AsRef<str>>(
        &self,
        names: &[S],
        provider: ProviderSelector,
    ) -> Result<CityTable, GeocodeError> {
        self.providers().get(provider)?;

        let mut rows = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let entry = self.resolve(name, provider).await?;
            rows.push(CityRow::new(name, entry));
        }

        let table = CityTable { rows };
        tracing::info!(
            "Resolved {} of {} names with {}",
            table.resolved().count(),
            table.len(),
            provider
        );
        Ok(table)
    }
}

/// Resolve `names` with up to `concurrency` lookups in flight.
///
/// Output shape and order match [`GeocodeResolver::resolve_many`]. Repeated
/// names trigger a single provider call; cache writes stay serialized.
///
/// # Errors
/// Same as [`GeocodeResolver::resolve_many`].
pub async fn resolve_many_concurrent(
    resolver: Arc<GeocodeResolver>,
    names: Vec<String>,
    provider: ProviderSelector,
    concurrency: usize,
) -> Result<CityTable, GeocodeError> {
    resolver.providers().get(provider)?;

    let total = names.len();
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, name) in names.iter().cloned().enumerate() {
        let resolver = Arc::clone(&resolver);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            // The semaphore is never closed, so acquire only fails if it is.
            let _permit = permits.acquire_owned().await.ok();
            let result = resolver.resolve(&name, provider).await;
            (index, name, result)
        });
    }

    let mut slots: Vec<Option<CityRow>> = vec![None; total];
    let mut first_error = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, name, Ok(entry))) => slots[index] = Some(CityRow::new(name, entry)),
            Ok((_, name, Err(e))) => {
                tracing::error!("Batch lookup for '{}' failed: {}", name, e);
                first_error.get_or_insert(e);
            }
            Err(join_err) => {
                tracing::error!("Batch lookup task failed: {}", join_err);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    // A panicked task leaves an empty slot; keep its row with no coordinates.
    let table: CityTable = slots
        .into_iter()
        .zip(names)
        .map(|(row, name)| row.unwrap_or_else(|| CityRow::new(name, CacheEntry::not_found())))
        .collect();

    tracing::info!(
        "Resolved {} of {} names with {} ({} concurrent)",
        table.resolved().count(),
        table.len(),
        provider,
        concurrency.max(1)
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CoordinateCache;
    use crate::provider::{Geocoder, ProviderRegistry};
    use async_trait::async_trait;
    use citymap_services::{ProviderError, RetryConfig};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Answers from a fixed table; unknown names time out.
    struct Gazetteer {
        places: HashMap<&'static str, Coordinates>,
        calls: AtomicU32,
    }

    impl Gazetteer {
        fn new() -> Self {
            let mut places = HashMap::new();
            places.insert("A", Coordinates::new(1.0, 1.0));
            places.insert("C", Coordinates::new(3.0, 3.0));
            Self {
                places,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Geocoder for Gazetteer {
        fn name(&self) -> &'static str {
            "gazetteer"
        }

        async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            match self.places.get(query) {
                Some(c) => Ok(Some(*c)),
                None => Err(ProviderError::Timeout("gazetteer".into())),
            }
        }
    }

    fn resolver(dir: &tempfile::TempDir, gazetteer: Arc<Gazetteer>) -> GeocodeResolver {
        let cache = Arc::new(CoordinateCache::load(dir.path().join("cache.json")));
        let providers = ProviderRegistry::new().with(ProviderSelector::Primary, gazetteer);
        GeocodeResolver::new(cache, providers, RetryConfig::with_max_attempts(2, 1, 1))
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_order_and_failed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(&dir, Arc::new(Gazetteer::new()));

        let table = resolver
            .resolve_many(&["A", "B", "C"], ProviderSelector::Primary)
            .await
            .unwrap();

        assert_eq!(table.len(), 3);
        let cities: Vec<&str> = table.iter().map(|r| r.city.as_str()).collect();
        assert_eq!(cities, vec!["A", "B", "C"]);
        assert_eq!(table.rows()[0].coordinates(), Some(Coordinates::new(1.0, 1.0)));
        assert_eq!(table.rows()[1].lat, None);
        assert_eq!(table.rows()[1].lon, None);
        assert_eq!(table.resolved().count(), 2);
    }

    #[tokio::test]
    async fn test_resolve_many_with_every_name_failing() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(&dir, Arc::new(Gazetteer::new()));

        let table = resolver
            .resolve_many(&["X", "Y", "Z"], ProviderSelector::Primary)
            .await
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.resolved().count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_many_invalid_provider_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let gazetteer = Arc::new(Gazetteer::new());
        let resolver = resolver(&dir, gazetteer.clone());

        let err = resolver
            .resolve_many(&["A"], ProviderSelector::Secondary)
            .await
            .unwrap_err();
        assert!(matches!(err, GeocodeError::InvalidProvider(_)));
        assert_eq!(gazetteer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_table_serializes_nulls() {
        let table: CityTable = vec![
            CityRow::new("A", CacheEntry::found(Coordinates::new(1.0, 2.0))),
            CityRow::new("B", CacheEntry::not_found()),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"city": "A", "lat": 1.0, "lon": 2.0},
                {"city": "B", "lat": null, "lon": null}
            ])
        );
    }

    #[tokio::test]
    async fn test_concurrent_batch_matches_sequential_shape() {
        let dir = tempfile::tempdir().unwrap();
        let gazetteer = Arc::new(Gazetteer::new());
        let resolver = Arc::new(resolver(&dir, gazetteer.clone()));

        let names: Vec<String> = ["C", "B", "A", "C", "A"].iter().map(|s| s.to_string()).collect();
        let table = resolve_many_concurrent(resolver.clone(), names, ProviderSelector::Primary, 3)
            .await
            .unwrap();

        let cities: Vec<&str> = table.iter().map(|r| r.city.as_str()).collect();
        assert_eq!(cities, vec!["C", "B", "A", "C", "A"]);
        assert_eq!(table.rows()[0].coordinates(), Some(Coordinates::new(3.0, 3.0)));
        assert_eq!(table.rows()[1].coordinates(), None);
        assert_eq!(table.rows()[3], table.rows()[0]);

        // A and C once each, B twice (two attempts): repeats were not re-queried.
        assert_eq!(gazetteer.calls.load(Ordering::SeqCst), 4);

        let reloaded = CoordinateCache::load(dir.path().join("cache.json"));
        assert_eq!(reloaded.len(), 3);
    }

    #[tokio::test]
    async fn test_to_coordinate_map_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(&dir, Arc::new(Gazetteer::new()));

        let table = resolver
            .resolve_many(&["C", "A"], ProviderSelector::Primary)
            .await
            .unwrap();
        let map = table.to_coordinate_map();
        assert_eq!(map[0].0, "C");
        assert_eq!(map[1], ("A".to_string(), CacheEntry::found(Coordinates::new(1.0, 1.0))));
    }

    /// Crashes on "Boom", otherwise answers like [`Gazetteer`].
    struct Crashing(Gazetteer);

    #[async_trait]
    impl Geocoder for Crashing {
        fn name(&self) -> &'static str {
            "crashing"
        }

        async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, ProviderError> {
            assert_ne!(query, "Boom", "geocoder crashed");
            self.0.geocode(query).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_batch_keeps_name_of_crashed_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CoordinateCache::load(dir.path().join("cache.json")));
        let providers = ProviderRegistry::new()
            .with(ProviderSelector::Primary, Arc::new(Crashing(Gazetteer::new())));
        let resolver = Arc::new(GeocodeResolver::new(
            cache,
            providers,
            RetryConfig::with_max_attempts(1, 1, 1),
        ));

        let names = vec!["A".to_string(), "Boom".to_string(), "C".to_string()];
        let table = resolve_many_concurrent(resolver, names, ProviderSelector::Primary, 3)
            .await
            .unwrap();

        let cities: Vec<&str> = table.iter().map(|r| r.city.as_str()).collect();
        assert_eq!(cities, vec!["A", "Boom", "C"]);
        assert_eq!(table.rows()[1].coordinates(), None);
        assert_eq!(table.resolved().count(), 2);
    }
}
