//! Geocode a city, then search around the resolved coordinates.

use std::sync::Arc;
use std::time::Duration;

use citymap_geocode::{CoordinateCache, GeocodeResolver, NominatimGeocoder, ProviderRegistry, ProviderSelector};
use citymap_poi::{PoiClient, PoiQuery};
use citymap_services::{Credential, RetryConfig};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_points_of_interest_around_resolved_city() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Kraków"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"lat": "50.049683", "lon": "19.944544"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/0.1/en/places/radius"))
        .and(query_param("lat", "50.049683"))
        .and(query_param("lon", "19.944544"))
        .and(query_param("kinds", "interesting_places"))
        .and(query_param("rate", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [19.935, 50.054]},
                    "properties": {"name": "Wawel Castle", "kinds": "castles,historic"}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [19.937, 50.061]},
                    "properties": {"name": "St. Mary's Basilica", "kinds": "churches,religion"}
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let geocoder = NominatimGeocoder::new("citymap-test/0.1", Duration::from_secs(5))
        .unwrap()
        .with_base_url(server.uri());
    let resolver = GeocodeResolver::new(
        Arc::new(CoordinateCache::load(dir.path().join("geocode_cache.json"))),
        ProviderRegistry::new().with(ProviderSelector::Primary, Arc::new(geocoder)),
        RetryConfig::with_max_attempts(2, 1, 1),
    );

    let coords = resolver
        .resolve("Kraków", ProviderSelector::Primary)
        .await
        .unwrap()
        .coordinates()
        .unwrap();

    let client = PoiClient::new(
        Credential::new("otm-key"),
        RetryConfig::with_max_attempts(2, 1, 1),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_base_url(server.uri());

    let query = PoiQuery::default()
        .with_kinds("interesting_places")
        .with_param("rate", "3");
    let places = client.get_points_of_interest(coords, &query).await.unwrap();

    assert_eq!(places.len(), 2);
    assert_eq!(places[0].name, "Wawel Castle");
    assert_eq!(places[1].kinds().collect::<Vec<_>>(), vec!["churches", "religion"]);
}
