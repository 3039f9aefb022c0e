use std::fmt;
use std::sync::Arc;

use crate::clock::{Clock, TokioClock};
use crate::config::GatewayConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::keys::{AddressKey, GridCell};
use crate::models::{Coordinate, Placemark};
use crate::provider::{GeocodeProvider, FORWARD_GEOCODE, REVERSE_GEOCODE};
use crate::queue::{QueueKey, QueueSettings, RequestQueue};
use crate::stats::GatewayStats;
use crate::throttle::Lane;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeocodeKey {
    Reverse(GridCell),
    Forward(AddressKey),
}

impl fmt::Display for GeocodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeKey::Reverse(cell) => write!(f, "reverse:{cell}"),
            GeocodeKey::Forward(address) => write!(f, "forward:{address}"),
        }
    }
}

impl QueueKey for GeocodeKey {
    fn lane(&self) -> Lane {
        Lane::Geocode
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeAnswer {
    Placemark(Placemark),
    Coordinate(Coordinate),
}

impl GeocodeAnswer {
    fn into_placemark(self) -> GatewayResult<Placemark> {
        match self {
            GeocodeAnswer::Placemark(placemark) => Ok(placemark),
            GeocodeAnswer::Coordinate(_) => Err(mismatch(REVERSE_GEOCODE)),
        }
    }

    fn into_coordinate(self) -> GatewayResult<Coordinate> {
        match self {
            GeocodeAnswer::Coordinate(coordinate) => Ok(coordinate),
            GeocodeAnswer::Placemark(_) => Err(mismatch(FORWARD_GEOCODE)),
        }
    }
}

fn mismatch(operation: &'static str) -> GatewayError {
    GatewayError::provider(operation, "cached answer has the wrong shape")
}

/// Reverse and forward geocoding behind one cache, one throttle lane and one
/// session budget.
#[derive(Clone)]
pub struct GeocodeGateway {
    provider: Arc<dyn GeocodeProvider>,
    queue: RequestQueue<GeocodeKey, GeocodeAnswer>,
}

impl GeocodeGateway {
    pub fn new(provider: Arc<dyn GeocodeProvider>, config: &GatewayConfig) -> Self {
        Self::with_clock(provider, config, Arc::new(TokioClock))
    }

    pub fn with_clock(
        provider: Arc<dyn GeocodeProvider>,
        config: &GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = RequestQueue::new(
            QueueSettings {
                name: "geocode",
                lanes: vec![(Lane::Geocode, config.geocode_min_interval())],
                budget: config.geocode_session_budget,
                cache_ttl: config.cache_ttl(),
            },
            clock,
        );
        Self { provider, queue }
    }

    pub async fn resolve_address(&self, coordinate: Coordinate) -> GatewayResult<Placemark> {
        let key = GeocodeKey::Reverse(GridCell::containing(coordinate)?);
        let provider = Arc::clone(&self.provider);
        self.queue
            .submit(key, move || async move {
                provider
                    .reverse_geocode(coordinate)
                    .await
                    .map(GeocodeAnswer::Placemark)
            })
            .await?
            .into_placemark()
    }

    pub async fn resolve_coordinate(&self, address: &str) -> GatewayResult<Coordinate> {
        let key = GeocodeKey::Forward(AddressKey::parse(address)?);
        let provider = Arc::clone(&self.provider);
        let query = address.trim().to_string();
        self.queue
            .submit(key, move || async move {
                provider
                    .forward_geocode(&query)
                    .await
                    .map(GeocodeAnswer::Coordinate)
            })
            .await?
            .into_coordinate()
    }

    pub fn cached_address(&self, coordinate: Coordinate) -> Option<Placemark> {
        let key = GeocodeKey::Reverse(GridCell::containing(coordinate).ok()?);
        self.queue.cached(&key)?.into_placemark().ok()
    }

    pub fn cached_coordinate(&self, address: &str) -> Option<Coordinate> {
        let key = GeocodeKey::Forward(AddressKey::parse(address).ok()?);
        self.queue.cached(&key)?.into_coordinate().ok()
    }

    pub fn invalidate_address(&self, coordinate: Coordinate) -> bool {
        GridCell::containing(coordinate)
            .map(|cell| self.queue.invalidate(&GeocodeKey::Reverse(cell)))
            .unwrap_or(false)
    }

    pub fn invalidate_coordinate(&self, address: &str) -> bool {
        AddressKey::parse(address)
            .map(|key| self.queue.invalidate(&GeocodeKey::Forward(key)))
            .unwrap_or(false)
    }

    pub fn clear_cache(&self) -> usize {
        self.queue.clear_cache()
    }

    pub fn remaining_budget(&self) -> u32 {
        self.queue.budget().remaining()
    }

    pub fn stats(&self) -> GatewayStats {
        self.queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct StubGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeocodeProvider for StubGeocoder {
        async fn reverse_geocode(&self, coordinate: Coordinate) -> GatewayResult<Placemark> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Placemark {
                formatted_address: "Market St, San Francisco".into(),
                name: None,
                locality: Some("San Francisco".into()),
                administrative_area: Some("CA".into()),
                postal_code: None,
                country: Some("US".into()),
                coordinate,
            })
        }

        async fn forward_geocode(&self, _address: &str) -> GatewayResult<Coordinate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Coordinate::new(37.3318, -122.0312))
        }
    }

    fn gateway(provider: Arc<StubGeocoder>) -> GeocodeGateway {
        GeocodeGateway::with_clock(
            provider,
            &GatewayConfig::default(),
            Arc::new(ManualClock::new()),
        )
    }

    #[tokio::test]
    async fn forward_lookups_ignore_case_and_spacing() {
        let provider = Arc::new(StubGeocoder::default());
        let gateway = gateway(Arc::clone(&provider));

        let first = gateway
            .resolve_coordinate("1 Infinite Loop, Cupertino")
            .await
            .unwrap();
        let second = gateway
            .resolve_coordinate("  1 infinite loop,   CUPERTINO ")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            gateway.cached_coordinate("1 INFINITE LOOP, CUPERTINO"),
            Some(first)
        );
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_queue() {
        let provider = Arc::new(StubGeocoder::default());
        let gateway = gateway(Arc::clone(&provider));

        let err = gateway.resolve_coordinate("   ").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
        let err = gateway
            .resolve_address(Coordinate::new(f64::NAN, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.remaining_budget(), 100);
    }

    #[tokio::test]
    async fn reverse_and_forward_keys_do_not_collide() {
        let provider = Arc::new(StubGeocoder::default());
        let gateway = gateway(Arc::clone(&provider));
        let here = Coordinate::new(37.7749, -122.4194);

        gateway.resolve_address(here).await.unwrap();
        gateway.resolve_coordinate("37.77,-122.42").await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(gateway.cached_address(here).is_some());
        assert!(gateway.invalidate_address(here));
        assert!(gateway.cached_address(here).is_none());
        assert_eq!(gateway.clear_cache(), 1);
    }
}
