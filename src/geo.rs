//! Coordinate primitives: validation, great-circle distance, movement test.
//!
//! Every coordinate entering the search pipeline passes through
//! [`validate`] first — nothing downstream has to re-check ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Earth radius used for all great-circle math, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Latitude/longitude delta (degrees) below which a position update is
/// not considered a real move (~50 m at mid latitudes).
pub const SIGNIFICANT_MOVE_DEG: f64 = 0.0005;

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Construct after validation. Returns the rejection reason on bad input.
    pub fn new(lat: f64, lon: f64) -> Result<Self, InvalidCoordinate> {
        validate(lat, lon)?;
        Ok(Self { lat, lon })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Why a coordinate pair was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidCoordinate {
    NotFinite,
    LatitudeOutOfRange,
    LongitudeOutOfRange,
}

impl fmt::Display for InvalidCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite => write!(f, "Coordinates must be finite numbers"),
            Self::LatitudeOutOfRange => write!(f, "Latitude must be between -90 and 90"),
            Self::LongitudeOutOfRange => write!(f, "Longitude must be between -180 and 180"),
        }
    }
}

impl std::error::Error for InvalidCoordinate {}

/// Pure coordinate predicate. Rejects NaN, infinities, and out-of-range
/// values; accepts the boundaries themselves.
pub fn validate(lat: f64, lon: f64) -> Result<(), InvalidCoordinate> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(InvalidCoordinate::NotFinite);
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(InvalidCoordinate::LatitudeOutOfRange);
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(InvalidCoordinate::LongitudeOutOfRange);
    }
    Ok(())
}

/// Haversine great-circle distance in meters, rounded to the nearest meter.
pub fn haversine_m(a: Coordinates, b: Coordinates) -> u32 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    (EARTH_RADIUS_M * c).round() as u32
}

/// Movement filter for continuous tracking: has the position moved far
/// enough from the last accepted fix to be worth a new search?
/// No prior fix always counts as significant.
pub fn significant_move(prev: Option<Coordinates>, next: Coordinates) -> bool {
    match prev {
        None => true,
        Some(p) => {
            (next.lat - p.lat).abs() > SIGNIFICANT_MOVE_DEG
                || (next.lon - p.lon).abs() > SIGNIFICANT_MOVE_DEG
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_in_range() {
        assert!(validate(0.0, 0.0).is_ok());
        assert!(validate(-90.0, 180.0).is_ok());
        assert!(validate(90.0, -180.0).is_ok());
    }

    #[test]
    fn test_validate_out_of_range() {
        assert_eq!(validate(91.0, 0.0), Err(InvalidCoordinate::LatitudeOutOfRange));
        assert_eq!(validate(0.0, 181.0), Err(InvalidCoordinate::LongitudeOutOfRange));
        assert_eq!(validate(-90.5, 0.0), Err(InvalidCoordinate::LatitudeOutOfRange));
    }

    #[test]
    fn test_validate_non_finite() {
        assert_eq!(validate(f64::NAN, 0.0), Err(InvalidCoordinate::NotFinite));
        assert_eq!(validate(0.0, f64::INFINITY), Err(InvalidCoordinate::NotFinite));
        assert_eq!(validate(f64::NEG_INFINITY, f64::NAN), Err(InvalidCoordinate::NotFinite));
    }

    #[test]
    fn test_haversine_known_distance() {
        // Stockholm central station → Stockholm city hall, roughly 1 km.
        let a = Coordinates { lat: 59.3307, lon: 18.0595 };
        let b = Coordinates { lat: 59.3275, lon: 18.0543 };
        let d = haversine_m(a, b);
        assert!((400..700).contains(&d), "got {}", d);
    }

    #[test]
    fn test_haversine_zero() {
        let p = Coordinates { lat: 21.4225, lon: 39.8262 };
        assert_eq!(haversine_m(p, p), 0);
    }

    #[test]
    fn test_haversine_short_range() {
        // ~0.00045° of latitude is ~50 m.
        let a = Coordinates { lat: 59.3293, lon: 18.0686 };
        let b = Coordinates { lat: 59.32975, lon: 18.0686 };
        let d = haversine_m(a, b);
        assert!((45..=55).contains(&d), "got {}", d);
    }

    #[test]
    fn test_significant_move_no_prior() {
        let p = Coordinates { lat: 1.0, lon: 1.0 };
        assert!(significant_move(None, p));
    }

    #[test]
    fn test_significant_move_threshold() {
        let prev = Coordinates { lat: 59.3293, lon: 18.0686 };
        let near = Coordinates { lat: 59.3294, lon: 18.0686 };
        let far = Coordinates { lat: 59.3300, lon: 18.0686 };
        assert!(!significant_move(Some(prev), near));
        assert!(significant_move(Some(prev), far));
    }
}
