use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use citymap_services::ProviderError;

use crate::error::GeocodeError;
use crate::types::{Coordinates, ProviderSelector};

/// A forward geocoding backend.
///
/// `Ok(None)` means the provider answered but found nothing. Errors are
/// classified as transient or not by [`ProviderError`]'s retry decision.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, ProviderError>;
}

/// Backends keyed by selector. A selector with no registered backend is
/// rejected as an invalid provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    backends: BTreeMap<ProviderSelector, Arc<dyn Geocoder>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: ProviderSelector, geocoder: Arc<dyn Geocoder>) -> Self {
        self.register(selector, geocoder);
        self
    }

    pub fn register(&mut self, selector: ProviderSelector, geocoder: Arc<dyn Geocoder>) {
        tracing::debug!("Registering {} geocoder as {}", geocoder.name(), selector);
        self.backends.insert(selector, geocoder);
    }

    /// # Errors
    /// [`GeocodeError::InvalidProvider`] if nothing is registered for `selector`.
    pub fn get(&self, selector: ProviderSelector) -> Result<Arc<dyn Geocoder>, GeocodeError> {
        self.backends
            .get(&selector)
            .cloned()
            .ok_or_else(|| GeocodeError::InvalidProvider(selector.to_string()))
    }

    pub fn selectors(&self) -> Vec<ProviderSelector> {
        self.backends.keys().copied().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.backends.iter().map(|(k, v)| (k, v.name())))
            .finish()
    }
}
