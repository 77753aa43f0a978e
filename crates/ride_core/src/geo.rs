//! Coordinates, great-circle distance, and the backend's `"lat,lng"` wire form.

use std::fmt;
use std::str::FromStr;

use h3o::LatLng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest billable trip; the backend never quotes below this.
pub const MIN_TRIP_DISTANCE_KM: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("invalid coordinates ({lat}, {lng})")]
    Invalid { lat: f64, lng: f64 },
    #[error("cannot parse location '{0}', expected \"lat,lng\"")]
    Parse(String),
}

/// A validated latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates", into = "RawCoordinates")]
pub struct Coordinates {
    lat: f64,
    lng: f64,
    point: LatLng,
}

#[derive(Serialize, Deserialize)]
struct RawCoordinates {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinates) -> Result<Self, Self::Error> {
        Coordinates::new(raw.lat, raw.lng)
    }
}

impl From<Coordinates> for RawCoordinates {
    fn from(coords: Coordinates) -> Self {
        RawCoordinates {
            lat: coords.lat,
            lng: coords.lng,
        }
    }
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::Invalid { lat, lng });
        }
        let point = LatLng::new(lat, lng).map_err(|_| CoordinateError::Invalid { lat, lng })?;
        Ok(Self { lat, lng, point })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        self.point.distance_km(other.point)
    }

    /// Backend wire form, e.g. `"17.385,78.4867"`.
    pub fn to_wire(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }

    /// Parse the backend wire form.
    pub fn parse(input: &str) -> Result<Self, CoordinateError> {
        let mut parts = input.split(',');
        let (Some(lat), Some(lng), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CoordinateError::Parse(input.to_string()));
        };
        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|_| CoordinateError::Parse(input.to_string()))?;
        let lng = lng
            .trim()
            .parse::<f64>()
            .map_err(|_| CoordinateError::Parse(input.to_string()))?;
        Self::new(lat, lng)
    }
}

impl FromStr for Coordinates {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Billable trip distance: great-circle km, floored at [`MIN_TRIP_DISTANCE_KM`]
/// and rounded to two decimals.
pub fn trip_distance_km(pickup: &Coordinates, destination: &Coordinates) -> f64 {
    let km = pickup.distance_km(destination).max(MIN_TRIP_DISTANCE_KM);
    (km * 100.0).round() / 100.0
}

/// Devices occasionally report an exact zero axis when they have no fix.
pub fn is_plausible_fix(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && lat != 0.0 && lng != 0.0
}
