//! Local tangent-plane projection between WGS84 and a Cartesian frame.
//!
//! Equirectangular approximation around a per-station reference point: good
//! to a few meters over kilometer scales, which is far below the coarsest
//! scoring bucket. `from_cartesian` is the exact inverse of `to_cartesian`
//! for the same reference.

use crate::types::EARTH_RADIUS;

/// Convert a WGS84 point `(lat, lon)` in decimal degrees into meters
/// `(x east, y north)` relative to `reference`.
pub fn to_cartesian(reference: (f64, f64), point: (f64, f64)) -> (f64, f64) {
    let d_lat = (point.0 - reference.0).to_radians();
    let d_lon = (point.1 - reference.1).to_radians();
    let x = EARTH_RADIUS * d_lon * reference.0.to_radians().cos();
    let y = EARTH_RADIUS * d_lat;
    (x, y)
}

/// Convert meters `(x east, y north)` relative to `reference` back into a
/// WGS84 point `(lat, lon)` in decimal degrees.
pub fn from_cartesian(reference: (f64, f64), point: (f64, f64)) -> (f64, f64) {
    let d_lat = point.1 / EARTH_RADIUS;
    let d_lon = point.0 / (EARTH_RADIUS * reference.0.to_radians().cos());
    let lat = reference.0 + d_lat.to_degrees();
    let lon = reference.1 + d_lon.to_degrees();
    (lat, lon)
}
