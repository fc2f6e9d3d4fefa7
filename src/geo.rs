//! geo.rs — points on the sphere.
//!
//! Distances are great-circle (haversine); interpolation between two
//! points is plain linear, which is fine for the short segments of a
//! densely sampled track.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build from a GeoJSON position (`[lon, lat, ...]`).
    pub fn from_lon_lat(position: &[f64]) -> Option<Self> {
        match position {
            [lon, lat, ..] => Some(Self::new(*lat, *lon)),
            _ => None,
        }
    }

    pub fn to_lon_lat(self) -> Vec<f64> {
        vec![self.lon, self.lat]
    }

    /// Point at fraction `t` of the way from `a` to `b`.
    pub fn lerp(a: Self, b: Self, t: f64) -> Self {
        Self::new(a.lat + (b.lat - a.lat) * t, a.lon + (b.lon - a.lon) * t)
    }
}

/// Great-circle distance between `a` and `b` in metres.
pub fn haversine(a: LatLon, b: LatLon) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let s = (d_lat / 2.0).sin().powi(2) + (d_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
    2.0 * EARTH_RADIUS_M * s.sqrt().atan2((1.0 - s).sqrt())
}
