use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::trace;

use crate::config::GatewayConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::models::{Coordinate, Place, Placemark};
use crate::provider::{
    GeocodeProvider, PlaceProvider, FORWARD_GEOCODE, PLACE_DETAILS, PLACE_SEARCH, REVERSE_GEOCODE,
};

const DETAILS_FIELDS: &str = "place_id,name,formatted_address,geometry,types,rating,photos";

/// Google Geocoding + Places web service client.
#[derive(Clone)]
pub struct GoogleMapsClient {
    http: Client,
    api_key: SecretString,
    geocode_api_base: String,
    places_api_base: String,
}

impl GoogleMapsClient {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let api_key = config
            .google_maps_api_key
            .clone()
            .ok_or_else(|| GatewayError::Config("GOOGLE_MAPS_API_KEY is not configured".into()))?;
        let http = Client::builder()
            .user_agent(concat!("geo-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(config.provider_timeout())
            .build()
            .map_err(|err| GatewayError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            api_key,
            geocode_api_base: config.geocode_api_base.trim_end_matches('/').to_string(),
            places_api_base: config.places_api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, base: &str, path: &str) -> GatewayResult<Url> {
        let mut url = Url::parse(&format!("{base}/{path}"))
            .map_err(|err| GatewayError::Config(format!("invalid API base URL: {err}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, operation: &'static str, url: Url) -> GatewayResult<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| GatewayError::provider(operation, err.to_string()))?
            .error_for_status()
            .map_err(|err| GatewayError::provider(operation, err.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| GatewayError::provider(operation, err.to_string()))?;
        trace!(operation, bytes = body.len(), "provider response received");
        serde_json::from_slice(&body)
            .map_err(|err| GatewayError::provider(operation, format!("malformed response: {err}")))
    }
}

#[async_trait]
impl GeocodeProvider for GoogleMapsClient {
    async fn reverse_geocode(&self, coordinate: Coordinate) -> GatewayResult<Placemark> {
        let mut url = self.endpoint(&self.geocode_api_base, "json")?;
        url.query_pairs_mut().append_pair(
            "latlng",
            &format!("{},{}", coordinate.latitude, coordinate.longitude),
        );
        let response: GeocodeResponse = self.fetch(REVERSE_GEOCODE, url).await?;
        let result = response.first_result(REVERSE_GEOCODE)?;
        Ok(result.into_placemark(coordinate))
    }

    async fn forward_geocode(&self, address: &str) -> GatewayResult<Coordinate> {
        let mut url = self.endpoint(&self.geocode_api_base, "json")?;
        url.query_pairs_mut().append_pair("address", address);
        let response: GeocodeResponse = self.fetch(FORWARD_GEOCODE, url).await?;
        let result = response.first_result(FORWARD_GEOCODE)?;
        result
            .geometry
            .map(|geometry| geometry.location.into())
            .ok_or_else(|| GatewayError::provider(FORWARD_GEOCODE, "result has no geometry"))
    }
}

#[async_trait]
impl PlaceProvider for GoogleMapsClient {
    async fn search(
        &self,
        location: Coordinate,
        radius_meters: u32,
        category: Option<&str>,
    ) -> GatewayResult<Vec<Place>> {
        let mut url = self.endpoint(&self.places_api_base, "nearbysearch/json")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair(
                    "location",
                    &format!("{},{}", location.latitude, location.longitude),
                )
                .append_pair("radius", &radius_meters.to_string());
            if let Some(category) = category {
                query.append_pair("type", category);
            }
        }
        let response: SearchResponse = self.fetch(PLACE_SEARCH, url).await?;
        match response.status.as_str() {
            "ZERO_RESULTS" => Ok(Vec::new()),
            _ => {
                check_status(PLACE_SEARCH, &response.status, response.error_message)?;
                response
                    .results
                    .into_iter()
                    .map(|raw| raw.into_place(PLACE_SEARCH))
                    .collect()
            }
        }
    }

    async fn details(&self, place_id: &str) -> GatewayResult<Place> {
        let mut url = self.endpoint(&self.places_api_base, "details/json")?;
        url.query_pairs_mut()
            .append_pair("place_id", place_id)
            .append_pair("fields", DETAILS_FIELDS);
        let response: DetailsResponse = self.fetch(PLACE_DETAILS, url).await?;
        check_status(PLACE_DETAILS, &response.status, response.error_message)?;
        response
            .result
            .ok_or_else(|| GatewayError::provider(PLACE_DETAILS, "response missing result"))?
            .into_place(PLACE_DETAILS)
    }
}

fn check_status(
    operation: &'static str,
    status: &str,
    error_message: Option<String>,
) -> GatewayResult<()> {
    match status {
        "OK" => Ok(()),
        "ZERO_RESULTS" => Err(GatewayError::provider(operation, "no results")),
        other => Err(GatewayError::provider(
            operation,
            match error_message {
                Some(message) => format!("{other}: {message}"),
                None => other.to_string(),
            },
        )),
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

impl GeocodeResponse {
    fn first_result(self, operation: &'static str) -> GatewayResult<GeocodeResult> {
        check_status(operation, &self.status, self.error_message)?;
        self.results
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::provider(operation, "no results"))
    }
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: Option<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    geometry: Option<Geometry>,
}

impl GeocodeResult {
    fn into_placemark(self, requested: Coordinate) -> Placemark {
        let component = |kind: &str| {
            self.address_components
                .iter()
                .find(|c| c.types.iter().any(|t| t == kind))
                .map(|c| c.long_name.clone())
        };
        let name = component("point_of_interest")
            .or_else(|| component("premise"))
            .or_else(|| component("route"));
        let locality = component("locality");
        let administrative_area = component("administrative_area_level_1");
        let postal_code = component("postal_code");
        let country = component("country");
        Placemark {
            formatted_address: self.formatted_address.clone().unwrap_or_default(),
            name,
            locality,
            administrative_area,
            postal_code,
            country,
            coordinate: self
                .geometry
                .as_ref()
                .map(|geometry| geometry.location.into())
                .unwrap_or(requested),
        }
    }
}

#[derive(Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize, Clone, Copy)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl From<LatLng> for Coordinate {
    fn from(value: LatLng) -> Self {
        Coordinate::new(value.lat, value.lng)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<RawPlace>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct DetailsResponse {
    status: String,
    result: Option<RawPlace>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct RawPlace {
    place_id: Option<String>,
    name: Option<String>,
    formatted_address: Option<String>,
    vicinity: Option<String>,
    geometry: Option<Geometry>,
    #[serde(default)]
    types: Vec<String>,
    rating: Option<f32>,
    #[serde(default)]
    photos: Vec<RawPhoto>,
}

#[derive(Deserialize)]
struct RawPhoto {
    photo_reference: String,
}

impl RawPlace {
    fn into_place(self, operation: &'static str) -> GatewayResult<Place> {
        let place_id = self
            .place_id
            .ok_or_else(|| GatewayError::provider(operation, "result missing place_id"))?;
        let coordinate = self
            .geometry
            .map(|geometry| geometry.location.into())
            .ok_or_else(|| GatewayError::provider(operation, "result missing geometry"))?;
        Ok(Place {
            place_id,
            name: self.name.unwrap_or_default(),
            formatted_address: self.formatted_address.or(self.vicinity),
            coordinate,
            types: self.types,
            rating: self.rating,
            photo_references: self
                .photos
                .into_iter()
                .map(|photo| photo.photo_reference)
                .collect(),
        })
    }
}
