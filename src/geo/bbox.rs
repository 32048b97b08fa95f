//! Geographic bounding boxes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Earth radius used by the spherical approximation, in meters
const EARTH_RADIUS_M: f64 = 6_378_000.0;

/// Axis-aligned box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Box centred on `(lat, lon)` reaching `radius_m` meters in each direction.
    ///
    /// Uses great-circle deltas on a sphere. The longitude span widens with
    /// latitude; once the radius wraps the parallel the box covers every
    /// longitude. Edges are clamped to valid coordinates, so a box near the
    /// antimeridian stops at ±180 rather than wrapping.
    pub fn around(lat: f64, lon: f64, radius_m: f64) -> Self {
        let radius_m = radius_m.abs();
        let lat_delta = (radius_m / EARTH_RADIUS_M).min(1.0).asin().to_degrees();

        let parallel = EARTH_RADIUS_M * lat.to_radians().cos();
        let (min_lon, max_lon) = if parallel <= 0.0 || radius_m / parallel >= 1.0 {
            (-180.0, 180.0)
        } else {
            let lon_delta = (radius_m / parallel).asin().to_degrees();
            ((lon - lon_delta).max(-180.0), (lon + lon_delta).min(180.0))
        };

        Self {
            min_lon,
            min_lat: (lat - lat_delta).max(-90.0),
            max_lon,
            max_lat: (lat + lat_delta).min(90.0),
        }
    }

    /// `left,bottom,right,top` as used in query strings
    pub fn to_query(&self) -> String {
        format!(
            "{:.7},{:.7},{:.7},{:.7}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.5}, {:.5}) - ({:.5}, {:.5})",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}
