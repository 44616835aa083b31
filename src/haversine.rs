//! Haversine travel matrix provider (fallback when OSRM unavailable).
//!
//! Uses great-circle distance with a fixed urban speed to estimate travel
//! time. Less accurate than OSRM (ignores roads) but always available.

use crate::error::MatrixError;
use crate::traits::{DistanceMatrixProvider, TravelMatrix};

/// Average courier speed in city traffic.
pub const DEFAULT_SPEED_KMH: f64 = 25.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lng) points in kilometers.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Whether a coordinate pair is a usable (lat, lng).
pub fn is_valid_location(location: (f64, f64)) -> bool {
    let (lat, lng) = location;
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Mean of a set of points. Returns (0, 0) for an empty slice.
pub fn centroid(points: &[(f64, f64)]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let n = points.len() as f64;
    let (lat, lng) = points
        .iter()
        .fold((0.0, 0.0), |acc, point| (acc.0 + point.0, acc.1 + point.1));
    (lat / n, lng / n)
}

/// Distance in km from `point` to the segment `a`-`b`.
///
/// Uses a local equirectangular projection around `point`, which is accurate
/// at city scale.
pub fn point_segment_km(point: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let km_per_lat = 110.574;
    let km_per_lng = 111.320 * point.0.to_radians().cos();
    let project = |p: (f64, f64)| ((p.1 - point.1) * km_per_lng, (p.0 - point.0) * km_per_lat);

    let (ax, ay) = project(a);
    let (bx, by) = project(b);
    let (dx, dy) = (bx - ax, by - ay);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq == 0.0 {
        0.0
    } else {
        (-(ax * dx + ay * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

/// Distance in km from `point` to the nearest part of `path`.
/// Infinite for an empty path.
pub fn path_distance_km(point: (f64, f64), path: &[(f64, f64)]) -> f64 {
    match path {
        [] => f64::INFINITY,
        [only] => haversine_km(point, *only),
        _ => path
            .windows(2)
            .map(|pair| point_segment_km(point, pair[0], pair[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Haversine-based travel matrix provider.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Convert distance in km to travel time in seconds.
    fn km_to_seconds(&self, km: f64) -> i32 {
        let hours = km / self.speed_kmh;
        (hours * 3600.0).round() as i32
    }
}

impl DistanceMatrixProvider for HaversineMatrix {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Result<TravelMatrix, MatrixError> {
        let n = locations.len();
        let mut durations = vec![vec![0; n]; n];
        let mut distances = vec![vec![0; n]; n];

        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate() {
                if i != j {
                    let km = haversine_km(*from, *to);
                    durations[i][j] = self.km_to_seconds(km);
                    distances[i][j] = (km * 1000.0).round() as i32;
                }
            }
        }

        Ok(TravelMatrix {
            durations,
            distances,
        })
    }
}
