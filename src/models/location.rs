use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MAX_LATITUDE: f64 = 90.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Serialized as a `[lat, lon]` pair, the shape the web client reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredPoint", into = "[f64; 2]")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AppError> {
        let point = Self {
            latitude,
            longitude,
        };

        if !point.is_valid() {
            return Err(AppError::BadRequest(format!(
                "invalid coordinates ({latitude}, {longitude})"
            )));
        }

        Ok(point)
    }

    /// Both coordinates finite and within the geographic bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= MAX_LATITUDE
            && self.longitude.abs() <= MAX_LONGITUDE
    }
}

// The web client writes `[lat, lon]` pairs; older horse records use short keys.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPoint {
    Pair([f64; 2]),
    Named {
        #[serde(alias = "lat")]
        latitude: f64,
        #[serde(alias = "lon", alias = "lng")]
        longitude: f64,
    },
}

impl From<StoredPoint> for GeoPoint {
    fn from(stored: StoredPoint) -> Self {
        match stored {
            StoredPoint::Pair([latitude, longitude]) => Self {
                latitude,
                longitude,
            },
            StoredPoint::Named {
                latitude,
                longitude,
            } => Self {
                latitude,
                longitude,
            },
        }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(point: GeoPoint) -> Self {
        [point.latitude, point.longitude]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeQuery {
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl RangeQuery {
    pub fn new(latitude: f64, longitude: f64, radius_km: f64) -> Result<Self, AppError> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(AppError::BadRequest(format!("invalid radius {radius_km}")));
        }

        Ok(Self {
            center: GeoPoint::new(latitude, longitude)?,
            radius_km,
        })
    }
}
