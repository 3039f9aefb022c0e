use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validated(self) -> GatewayResult<Self> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(GatewayError::InvalidRequest(format!(
                "coordinate ({}, {}) is not finite",
                self.latitude, self.longitude
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude)
        {
            return Err(GatewayError::InvalidRequest(format!(
                "coordinate ({}, {}) is out of range",
                self.latitude, self.longitude
            )));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    pub formatted_address: String,
    pub name: Option<String>,
    pub locality: Option<String>,
    pub administrative_area: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    pub formatted_address: Option<String>,
    pub coordinate: Coordinate,
    pub types: Vec<String>,
    pub rating: Option<f32>,
    pub photo_references: Vec<String>,
}
