//! ETSI fixed-point to SI conversion constants.
//!
//! Raw CAM fields are integers in the units defined by ETSI TS 102 894-2;
//! multiplying by the matching constant yields the SI value used by the
//! motion models.

use std::f64::consts::PI;

/// Latitude raw unit: 0.1 microdegree.
pub const LATITUDE_UNIT: f64 = 0.1 * 1e-6;

/// Longitude raw unit: 0.1 microdegree.
pub const LONGITUDE_UNIT: f64 = 0.1 * 1e-6;

/// Altitude raw unit: centimeters.
pub const ALTITUDE_UNIT: f64 = 0.01;

/// Heading raw unit: 0.1 degree, converted to radians.
pub const HEADING_UNIT: f64 = 0.1 * PI / 180.0;

/// Speed raw unit: cm/s.
pub const SPEED_UNIT: f64 = 0.01;

/// Acceleration raw unit: 0.1 m/s².
pub const ACCELERATION_UNIT: f64 = 0.1;

/// Yaw rate raw unit: 0.01 deg/s.
pub const YAW_RATE_UNIT: f64 = 0.01;

/// Steering wheel angle scale factor.
pub const STEERING_WHEEL_ANGLE_UNIT: f64 = 1.5;

/// Generation delta time raw unit: milliseconds.
pub const TIME_UNIT: f64 = 0.001;

/// Nominal CAM period in seconds, used when two samples carry the same
/// generation delta time.
pub const MEAN_DELTA_TIME: f64 = 0.2;
