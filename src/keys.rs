use std::fmt;

use serde::Serialize;

use crate::errors::{GatewayError, GatewayResult};
use crate::models::Coordinate;

const GRID_CELLS_PER_DEGREE: f64 = 100.0;
// Absorbs binary representation error so 37.80 lands in cell 3780, not 3779.
const GRID_EPSILON: f64 = 1e-9;

/// A 0.01° square of the globe (roughly 1.1 km at the equator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GridCell {
    lat_cell: i32,
    lng_cell: i32,
}

impl GridCell {
    pub fn containing(coordinate: Coordinate) -> GatewayResult<Self> {
        let coordinate = coordinate.validated()?;
        Ok(Self {
            lat_cell: quantize(coordinate.latitude),
            lng_cell: quantize(coordinate.longitude),
        })
    }

    pub fn south_west(&self) -> Coordinate {
        Coordinate::new(
            self.lat_cell as f64 / GRID_CELLS_PER_DEGREE,
            self.lng_cell as f64 / GRID_CELLS_PER_DEGREE,
        )
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let corner = self.south_west();
        write!(f, "{:.2},{:.2}", corner.latitude, corner.longitude)
    }
}

fn quantize(degrees: f64) -> i32 {
    // Normalizes -0.0 to cell 0 as well.
    (degrees * GRID_CELLS_PER_DEGREE + GRID_EPSILON).floor() as i32
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AddressKey(String);

impl AddressKey {
    pub fn parse(address: &str) -> GatewayResult<Self> {
        normalize_text(address)
            .map(Self)
            .ok_or_else(|| GatewayError::InvalidRequest("address is empty".into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlaceSearchKey {
    pub cell: GridCell,
    pub radius_meters: u32,
    pub category: Option<String>,
}

impl PlaceSearchKey {
    pub fn new(
        location: Coordinate,
        radius_meters: u32,
        category: Option<&str>,
    ) -> GatewayResult<Self> {
        Ok(Self {
            cell: GridCell::containing(location)?,
            radius_meters,
            category: category.and_then(normalize_text),
        })
    }
}

impl fmt::Display for PlaceSearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}m|{}",
            self.cell,
            self.radius_meters,
            self.category.as_deref().unwrap_or("*")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlaceIdKey(String);

impl PlaceIdKey {
    pub fn parse(place_id: &str) -> GatewayResult<Self> {
        let trimmed = place_id.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::InvalidRequest("place id is empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceIdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_text(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}
