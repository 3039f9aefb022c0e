use async_trait::async_trait;

use crate::errors::GatewayResult;
use crate::models::{Coordinate, Place, Placemark};

pub const REVERSE_GEOCODE: &str = "reverse geocode";
pub const FORWARD_GEOCODE: &str = "forward geocode";
pub const PLACE_SEARCH: &str = "place search";
pub const PLACE_DETAILS: &str = "place details";

#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn reverse_geocode(&self, coordinate: Coordinate) -> GatewayResult<Placemark>;
    async fn forward_geocode(&self, address: &str) -> GatewayResult<Coordinate>;
}

#[async_trait]
pub trait PlaceProvider: Send + Sync {
    async fn search(
        &self,
        location: Coordinate,
        radius_meters: u32,
        category: Option<&str>,
    ) -> GatewayResult<Vec<Place>>;
    async fn details(&self, place_id: &str) -> GatewayResult<Place>;
}
