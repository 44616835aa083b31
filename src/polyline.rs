//! Polyline representation for route geometries.
//!
//! Routes keep decoded coordinates internally. The compact Google polyline
//! encoding is only produced when handing geometry to the driver app's map.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::haversine::haversine_km;

/// Precision used by the Google Maps polyline format.
pub const DEFAULT_PRECISION: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolylineError {
    #[error("polyline ends in the middle of a value")]
    Truncated,
    #[error("invalid polyline character {0:?}")]
    InvalidChar(char),
}

/// A polyline representing a route geometry as decoded coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    /// Each point is a (latitude, longitude) tuple.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn into_points(self) -> Vec<(f64, f64)> {
        self.points
    }

    /// Sum of great-circle segment lengths.
    pub fn length_km(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine_km(pair[0], pair[1]))
            .sum()
    }

    /// Encode with the polyline algorithm at `precision` decimal digits.
    pub fn encode(&self, precision: u32) -> String {
        let factor = 10f64.powi(precision as i32);
        let mut out = String::new();
        let (mut prev_lat, mut prev_lng) = (0i64, 0i64);

        for &(lat, lng) in &self.points {
            let lat = (lat * factor).round() as i64;
            let lng = (lng * factor).round() as i64;
            encode_value(lat - prev_lat, &mut out);
            encode_value(lng - prev_lng, &mut out);
            prev_lat = lat;
            prev_lng = lng;
        }

        out
    }

    pub fn decode(encoded: &str, precision: u32) -> Result<Self, PolylineError> {
        let factor = 10f64.powi(precision as i32);
        let mut chars = encoded.chars();
        let mut points = Vec::new();
        let (mut lat, mut lng) = (0i64, 0i64);

        loop {
            let Some(delta_lat) = decode_value(&mut chars)? else {
                break;
            };
            let delta_lng = decode_value(&mut chars)?.ok_or(PolylineError::Truncated)?;
            lat += delta_lat;
            lng += delta_lng;
            points.push((lat as f64 / factor, lng as f64 / factor));
        }

        Ok(Self { points })
    }
}

fn encode_value(value: i64, out: &mut String) {
    let mut v = if value < 0 { !(value << 1) } else { value << 1 };
    while v >= 0x20 {
        out.push((((0x20 | (v & 0x1f)) + 63) as u8) as char);
        v >>= 5;
    }
    out.push(((v + 63) as u8) as char);
}

/// Returns `Ok(None)` at a clean end of input.
fn decode_value(chars: &mut std::str::Chars<'_>) -> Result<Option<i64>, PolylineError> {
    let mut result: i64 = 0;
    let mut shift = 0;
    let mut started = false;

    loop {
        let Some(c) = chars.next() else {
            return if started {
                Err(PolylineError::Truncated)
            } else {
                Ok(None)
            };
        };
        started = true;
        let byte = c as i64 - 63;
        if !(0..64).contains(&byte) || shift > 60 {
            return Err(PolylineError::InvalidChar(c));
        }
        result |= (byte & 0x1f) << shift;
        shift += 5;
        if byte < 0x20 {
            break;
        }
    }

    let value = if result & 1 != 0 { !(result >> 1) } else { result >> 1 };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn reference_points() -> Vec<(f64, f64)> {
        vec![(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)]
    }

    #[test]
    fn test_encode_reference_polyline() {
        let polyline = Polyline::new(reference_points());
        assert_eq!(polyline.encode(DEFAULT_PRECISION), REFERENCE);
    }

    #[test]
    fn test_decode_reference_polyline() {
        let polyline = Polyline::decode(REFERENCE, DEFAULT_PRECISION).unwrap();
        assert_eq!(polyline.points(), &reference_points()[..]);
    }

    #[test]
    fn test_empty_polyline() {
        let polyline = Polyline::new(vec![]);
        assert!(polyline.points().is_empty());
        assert_eq!(polyline.encode(DEFAULT_PRECISION), "");
        assert_eq!(polyline.length_km(), 0.0);
    }

    #[test]
    fn test_decode_truncated() {
        // Latitude only, longitude missing.
        assert_eq!(
            Polyline::decode("_p~iF", DEFAULT_PRECISION),
            Err(PolylineError::Truncated)
        );
    }

    #[test]
    fn test_decode_invalid_char() {
        assert!(matches!(
            Polyline::decode(" ", DEFAULT_PRECISION),
            Err(PolylineError::InvalidChar(' '))
        ));
    }

    #[test]
    fn test_length_km() {
        let polyline = Polyline::new(vec![(36.17, -115.14), (34.05, -118.24)]);
        let km = polyline.length_km();
        assert!(km > 350.0 && km < 400.0);
    }
}
