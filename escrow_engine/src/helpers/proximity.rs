//! Great-circle distance and handoff proximity classification.
//!
//! The functions here are pure. Obtaining location fixes and deciding whether they are recent enough is the caller's
//! job (see [`LocationSample::is_fresh`]); a missing or stale fix must be treated as "not verified" rather than fed in
//! as a degenerate coordinate.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
pub const DEFAULT_PROXIMITY_RADIUS_METERS: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("Longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("Accuracy {0} must be a non-negative number of metres")]
    InvalidAccuracy(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::InvalidLatitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::InvalidLongitude(lng));
        }
        Ok(Self { lat, lng })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityResult {
    pub distance_meters: f64,
    pub within_range: bool,
}

/// A device-reported location fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(point: GeoPoint, accuracy_m: Option<f64>, recorded_at: DateTime<Utc>) -> Result<Self, GeoError> {
        if let Some(acc) = accuracy_m {
            if !acc.is_finite() || acc < 0.0 {
                return Err(GeoError::InvalidAccuracy(acc));
            }
        }
        Ok(Self { lat: point.lat, lng: point.lng, accuracy_m, recorded_at })
    }

    pub fn point(&self) -> Result<GeoPoint, GeoError> {
        GeoPoint::new(self.lat, self.lng)
    }

    /// A fix is fresh if it was taken no more than `max_age` before `now`. Fixes claiming to come from further in the
    /// future than `max_age` are not trusted either.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let age = now - self.recorded_at;
        age <= max_age && age >= -max_age
    }
}

/// Haversine distance between two points, in metres.
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Clamp guards against h creeping past 1.0 through rounding on antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

pub fn check_proximity(a: GeoPoint, b: GeoPoint, radius_meters: f64) -> ProximityResult {
    let distance_meters = haversine_distance(a, b);
    ProximityResult { distance_meters, within_range: distance_meters <= radius_meters }
}
