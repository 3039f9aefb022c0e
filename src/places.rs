use std::fmt;
use std::sync::Arc;

use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};

use crate::clock::{Clock, TokioClock};
use crate::config::GatewayConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::keys::{PlaceIdKey, PlaceSearchKey};
use crate::models::{Coordinate, Place};
use crate::provider::{PlaceProvider, PLACE_DETAILS, PLACE_SEARCH};
use crate::queue::{QueueKey, QueueSettings, RequestQueue};
use crate::stats::GatewayStats;
use crate::throttle::Lane;

const MAX_SEARCH_RADIUS_METERS: u32 = 50_000;
const MAX_PHOTO_WIDTH: u32 = 1_600;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaceKey {
    Search(PlaceSearchKey),
    Details(PlaceIdKey),
}

impl fmt::Display for PlaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceKey::Search(key) => write!(f, "search:{key}"),
            PlaceKey::Details(key) => write!(f, "details:{key}"),
        }
    }
}

impl QueueKey for PlaceKey {
    fn lane(&self) -> Lane {
        match self {
            PlaceKey::Search(_) => Lane::PlaceSearch,
            PlaceKey::Details(_) => Lane::PlaceDetails,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaceAnswer {
    Places(Vec<Place>),
    Details(Place),
}

impl PlaceAnswer {
    fn into_places(self) -> GatewayResult<Vec<Place>> {
        match self {
            PlaceAnswer::Places(places) => Ok(places),
            PlaceAnswer::Details(_) => Err(GatewayError::provider(
                PLACE_SEARCH,
                "cached answer has the wrong shape",
            )),
        }
    }

    fn into_details(self) -> GatewayResult<Place> {
        match self {
            PlaceAnswer::Details(place) => Ok(place),
            PlaceAnswer::Places(_) => Err(GatewayError::provider(
                PLACE_DETAILS,
                "cached answer has the wrong shape",
            )),
        }
    }
}

#[derive(Clone)]
pub struct PlaceGateway {
    provider: Arc<dyn PlaceProvider>,
    queue: RequestQueue<PlaceKey, PlaceAnswer>,
    photo_endpoint: Url,
    api_key: Option<SecretString>,
}

impl PlaceGateway {
    pub fn new(provider: Arc<dyn PlaceProvider>, config: &GatewayConfig) -> GatewayResult<Self> {
        Self::with_clock(provider, config, Arc::new(TokioClock))
    }

    pub fn with_clock(
        provider: Arc<dyn PlaceProvider>,
        config: &GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> GatewayResult<Self> {
        let photo_endpoint = Url::parse(&format!("{}/photo", config.places_api_base))
            .map_err(|err| GatewayError::Config(format!("invalid places API base URL: {err}")))?;
        let queue = RequestQueue::new(
            QueueSettings {
                name: "places",
                lanes: vec![
                    (Lane::PlaceSearch, config.place_search_min_interval()),
                    (Lane::PlaceDetails, config.place_details_min_interval()),
                ],
                budget: config.places_session_budget,
                cache_ttl: config.cache_ttl(),
            },
            clock,
        );
        Ok(Self {
            provider,
            queue,
            photo_endpoint,
            api_key: config.google_maps_api_key.clone(),
        })
    }

    pub async fn search_places(
        &self,
        location: Coordinate,
        radius_meters: u32,
        category: Option<&str>,
    ) -> GatewayResult<Vec<Place>> {
        if radius_meters == 0 || radius_meters > MAX_SEARCH_RADIUS_METERS {
            return Err(GatewayError::InvalidRequest(format!(
                "search radius must be between 1 and {MAX_SEARCH_RADIUS_METERS} meters"
            )));
        }
        let key = PlaceSearchKey::new(location, radius_meters, category)?;
        let provider = Arc::clone(&self.provider);
        let category = key.category.clone();
        self.queue
            .submit(PlaceKey::Search(key), move || async move {
                provider
                    .search(location, radius_meters, category.as_deref())
                    .await
                    .map(PlaceAnswer::Places)
            })
            .await?
            .into_places()
    }

    pub async fn get_place_details(&self, place_id: &str) -> GatewayResult<Place> {
        let key = PlaceIdKey::parse(place_id)?;
        let provider = Arc::clone(&self.provider);
        let place_id = key.as_str().to_string();
        self.queue
            .submit(PlaceKey::Details(key), move || async move {
                provider
                    .details(&place_id)
                    .await
                    .map(PlaceAnswer::Details)
            })
            .await?
            .into_details()
    }

    pub fn get_photo_url(&self, photo_reference: &str, max_width: u32) -> GatewayResult<Url> {
        let reference = photo_reference.trim();
        if reference.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "photo reference is empty".into(),
            ));
        }
        let mut url = self.photo_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("maxwidth", &max_width.clamp(1, MAX_PHOTO_WIDTH).to_string())
                .append_pair("photo_reference", reference);
            if let Some(key) = &self.api_key {
                query.append_pair("key", key.expose_secret());
            }
        }
        Ok(url)
    }

    pub fn cached_search(
        &self,
        location: Coordinate,
        radius_meters: u32,
        category: Option<&str>,
    ) -> Option<Vec<Place>> {
        let key = PlaceSearchKey::new(location, radius_meters, category).ok()?;
        self.queue
            .cached(&PlaceKey::Search(key))?
            .into_places()
            .ok()
    }

    pub fn cached_details(&self, place_id: &str) -> Option<Place> {
        let key = PlaceIdKey::parse(place_id).ok()?;
        self.queue
            .cached(&PlaceKey::Details(key))?
            .into_details()
            .ok()
    }

    pub fn invalidate_details(&self, place_id: &str) -> bool {
        PlaceIdKey::parse(place_id)
            .map(|key| self.queue.invalidate(&PlaceKey::Details(key)))
            .unwrap_or(false)
    }

    pub fn invalidate_search(
        &self,
        location: Coordinate,
        radius_meters: u32,
        category: Option<&str>,
    ) -> bool {
        PlaceSearchKey::new(location, radius_meters, category)
            .map(|key| self.queue.invalidate(&PlaceKey::Search(key)))
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
