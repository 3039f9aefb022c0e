use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_GEOCODE_API_BASE: &str = "https://maps.googleapis.com/maps/api/geocode";
const DEFAULT_PLACES_API_BASE: &str = "https://maps.googleapis.com/maps/api/place";
const DEFAULT_SESSION_BUDGET: u32 = 100;

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub google_maps_api_key: Option<SecretString>,
    pub geocode_api_base: String,
    pub places_api_base: String,
    pub geocode_min_interval_ms: u64,
    pub place_search_min_interval_ms: u64,
    pub place_details_min_interval_ms: u64,
    pub geocode_session_budget: u32,
    pub places_session_budget: u32,
    pub cache_ttl_secs: Option<u64>,
    pub provider_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicGatewayConfig {
    pub geocode_api_base: String,
    pub places_api_base: String,
    pub geocode_min_interval_ms: u64,
    pub place_search_min_interval_ms: u64,
    pub place_details_min_interval_ms: u64,
    pub geocode_session_budget: u32,
    pub places_session_budget: u32,
    pub cache_ttl_secs: Option<u64>,
    pub provider_timeout_secs: u64,
    pub has_google_maps_key: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            google_maps_api_key: None,
            geocode_api_base: DEFAULT_GEOCODE_API_BASE.to_string(),
            places_api_base: DEFAULT_PLACES_API_BASE.to_string(),
            geocode_min_interval_ms: 1_200,
            place_search_min_interval_ms: 1_200,
            place_details_min_interval_ms: 500,
            geocode_session_budget: DEFAULT_SESSION_BUDGET,
            places_session_budget: DEFAULT_SESSION_BUDGET,
            cache_ttl_secs: None,
            provider_timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = Self::default();
        Self {
            google_maps_api_key: env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            geocode_api_base: parse_url_base("GEOCODE_API_BASE", &defaults.geocode_api_base),
            places_api_base: parse_url_base("PLACES_API_BASE", &defaults.places_api_base),
            geocode_min_interval_ms: parse_u64(
                "GEOCODE_MIN_INTERVAL_MS",
                defaults.geocode_min_interval_ms,
            ),
            place_search_min_interval_ms: parse_u64(
                "PLACE_SEARCH_MIN_INTERVAL_MS",
                defaults.place_search_min_interval_ms,
            ),
            place_details_min_interval_ms: parse_u64(
                "PLACE_DETAILS_MIN_INTERVAL_MS",
                defaults.place_details_min_interval_ms,
            ),
            geocode_session_budget: parse_u32(
                "GEOCODE_SESSION_BUDGET",
                defaults.geocode_session_budget,
            ),
            places_session_budget: parse_u32(
                "PLACES_SESSION_BUDGET",
                defaults.places_session_budget,
            ),
            cache_ttl_secs: Some(parse_u64("GEO_CACHE_TTL_SECS", 0)).filter(|secs| *secs > 0),
            provider_timeout_secs: parse_u64(
                "PROVIDER_TIMEOUT_SECS",
                defaults.provider_timeout_secs,
            )
            .max(1),
        }
    }

    pub fn public_profile(&self) -> PublicGatewayConfig {
        PublicGatewayConfig {
            geocode_api_base: self.geocode_api_base.clone(),
            places_api_base: self.places_api_base.clone(),
            geocode_min_interval_ms: self.geocode_min_interval_ms,
            place_search_min_interval_ms: self.place_search_min_interval_ms,
            place_details_min_interval_ms: self.place_details_min_interval_ms,
            geocode_session_budget: self.geocode_session_budget,
            places_session_budget: self.places_session_budget,
            cache_ttl_secs: self.cache_ttl_secs,
            provider_timeout_secs: self.provider_timeout_secs,
            has_google_maps_key: self.google_maps_api_key.is_some(),
        }
    }

    pub fn geocode_min_interval(&self) -> Duration {
        Duration::from_millis(self.geocode_min_interval_ms)
    }

    pub fn place_search_min_interval(&self) -> Duration {
        Duration::from_millis(self.place_search_min_interval_ms)
    }

    pub fn place_details_min_interval(&self) -> Duration {
        Duration::from_millis(self.place_details_min_interval_ms)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_url_base(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
