mod budget;
mod cache;
mod clock;
mod config;
mod errors;
mod geocode;
mod google;
mod keys;
mod models;
mod places;
mod provider;
mod queue;
mod stats;
mod throttle;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use budget::BudgetGuard;
pub use cache::ResultCache;
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{GatewayConfig, PublicGatewayConfig};
pub use errors::{GatewayError, GatewayResult};
pub use geocode::{GeocodeGateway, GeocodeKey};
pub use google::GoogleMapsClient;
pub use keys::{AddressKey, GridCell, PlaceIdKey, PlaceSearchKey};
pub use models::{Coordinate, Place, Placemark};
pub use places::{PlaceGateway, PlaceKey};
pub use provider::{GeocodeProvider, PlaceProvider};
pub use queue::{QueueKey, QueueSettings, RequestQueue};
pub use stats::GatewayStats;
pub use throttle::{Lane, Throttle};

/// Both gateways wired to one provider client, built once per process and
/// handed to whatever needs geodata.
#[derive(Clone)]
pub struct GeoServices {
    config: GatewayConfig,
    geocode: GeocodeGateway,
    places: PlaceGateway,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub config: PublicGatewayConfig,
    pub geocode: GatewayStats,
    pub places: GatewayStats,
}

impl GeoServices {
    pub fn from_env() -> GatewayResult<Self> {
        init_tracing();
        Self::from_config(GatewayConfig::from_env())
    }

    pub fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        let client = Arc::new(GoogleMapsClient::new(&config)?);
        Self::with_providers(config, client.clone(), client, Arc::new(TokioClock))
    }

    pub fn with_providers(
        config: GatewayConfig,
        geocoder: Arc<dyn GeocodeProvider>,
        places: Arc<dyn PlaceProvider>,
        clock: Arc<dyn Clock>,
    ) -> GatewayResult<Self> {
        let geocode = GeocodeGateway::with_clock(geocoder, &config, Arc::clone(&clock));
        let places = PlaceGateway::with_clock(places, &config, clock)?;
        info!(
            geocode_budget = config.geocode_session_budget,
            places_budget = config.places_session_budget,
            cache_ttl_secs = ?config.cache_ttl_secs,
            "geodata gateways ready"
        );
        Ok(Self {
            config,
            geocode,
            places,
        })
    }

    pub fn geocode(&self) -> &GeocodeGateway {
        &self.geocode
    }

    pub fn places(&self) -> &PlaceGateway {
        &self.places
    }

    pub fn health(&self) -> GatewayHealth {
        GatewayHealth {
            config: self.config.public_profile(),
            geocode: self.geocode.stats(),
            places: self.places.stats(),
        }
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,geo_gateway=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
