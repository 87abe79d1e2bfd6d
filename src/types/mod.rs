//! Value objects for the decoded CAM kinematic state.
//!
//! Every quantity keeps its raw wire integer; SI values are derived through
//! the constants in [`units`]. Raw values compare and serialize in integer
//! form so a decoded reading round-trips bit for bit.

pub mod units;

use serde::{Deserialize, Serialize};

use units::{
    ACCELERATION_UNIT, ALTITUDE_UNIT, HEADING_UNIT, LATITUDE_UNIT, LONGITUDE_UNIT, SPEED_UNIT,
    STEERING_WHEEL_ANGLE_UNIT, TIME_UNIT, YAW_RATE_UNIT,
};

/// ETSI station classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationType {
    #[default]
    Unknown,
    Pedestrian,
    Cyclist,
    Moped,
    Motorcycle,
    PassengerCar,
    Bus,
    LightTruck,
    HeavyTruck,
    Trailer,
    SpecialVehicles,
    Tram,
    RoadSideUnit,
}

impl From<i32> for StationType {
    fn from(raw: i32) -> Self {
        match raw {
            1 => StationType::Pedestrian,
            2 => StationType::Cyclist,
            3 => StationType::Moped,
            4 => StationType::Motorcycle,
            5 => StationType::PassengerCar,
            6 => StationType::Bus,
            7 => StationType::LightTruck,
            8 => StationType::HeavyTruck,
            9 => StationType::Trailer,
            10 => StationType::SpecialVehicles,
            11 => StationType::Tram,
            15 => StationType::RoadSideUnit,
            _ => StationType::Unknown,
        }
    }
}

/// Heading over ground, 0.1-degree raw units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    raw: i32,
    confidence: i32,
}

impl Heading {
    pub fn new(raw: i32, confidence: i32) -> Self {
        Self { raw, confidence }
    }

    pub fn raw(&self) -> i32 {
        self.raw
    }

    pub fn confidence(&self) -> i32 {
        self.confidence
    }

    /// Heading in radians.
    pub fn value(&self) -> f64 {
        f64::from(self.raw) * HEADING_UNIT
    }
}

/// Speed over ground, cm/s raw units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speed {
    raw: i32,
    confidence: i32,
}

impl Speed {
    pub fn new(raw: i32, confidence: i32) -> Self {
        Self { raw, confidence }
    }

    pub fn raw(&self) -> i32 {
        self.raw
    }

    pub fn confidence(&self) -> i32 {
        self.confidence
    }

    /// Speed in m/s.
    pub fn value(&self) -> f64 {
        f64::from(self.raw) * SPEED_UNIT
    }
}

/// The three acceleration components plus the acceleration-control bitfield.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceleration {
    control: String,
    longitudinal: i32,
    longitudinal_confidence: i32,
    lateral: i32,
    lateral_confidence: i32,
    vertical: i32,
    vertical_confidence: i32,
}

impl Default for Acceleration {
    fn default() -> Self {
        Self {
            control: "unavailable".to_owned(),
            longitudinal: 0,
            longitudinal_confidence: 0,
            lateral: 0,
            lateral_confidence: 0,
            vertical: 0,
            vertical_confidence: 0,
        }
    }
}

impl Acceleration {
    pub fn new(
        control: String,
        longitudinal: (i32, i32),
        lateral: (i32, i32),
        vertical: (i32, i32),
    ) -> Self {
        Self {
            control,
            longitudinal: longitudinal.0,
            longitudinal_confidence: longitudinal.1,
            lateral: lateral.0,
            lateral_confidence: lateral.1,
            vertical: vertical.0,
            vertical_confidence: vertical.1,
        }
    }

    pub fn control(&self) -> &str {
        &self.control
    }

    /// Longitudinal acceleration in m/s².
    pub fn longitudinal(&self) -> f64 {
        f64::from(self.longitudinal) * ACCELERATION_UNIT
    }

    pub fn raw_longitudinal(&self) -> i32 {
        self.longitudinal
    }

    pub fn longitudinal_confidence(&self) -> i32 {
        self.longitudinal_confidence
    }

    /// Lateral acceleration in m/s².
    pub fn lateral(&self) -> f64 {
        f64::from(self.lateral) * ACCELERATION_UNIT
    }

    pub fn raw_lateral(&self) -> i32 {
        self.lateral
    }

    pub fn lateral_confidence(&self) -> i32 {
        self.lateral_confidence
    }

    /// Vertical acceleration in m/s².
    pub fn vertical(&self) -> f64 {
        f64::from(self.vertical) * ACCELERATION_UNIT
    }

    pub fn raw_vertical(&self) -> i32 {
        self.vertical
    }

    pub fn vertical_confidence(&self) -> i32 {
        self.vertical_confidence
    }
}

/// Yaw rate, 0.01 deg/s raw units with a textual confidence tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YawRate {
    raw: i32,
    confidence: String,
}

impl Default for YawRate {
    fn default() -> Self {
        Self {
            raw: 0,
            confidence: "unavailable".to_owned(),
        }
    }
}

impl YawRate {
    pub fn new(raw: i32, confidence: String) -> Self {
        Self { raw, confidence }
    }

    pub fn raw(&self) -> i32 {
        self.raw
    }

    pub fn confidence(&self) -> &str {
        &self.confidence
    }

    pub fn value(&self) -> f64 {
        f64::from(self.raw) * YAW_RATE_UNIT
    }
}

/// Curvature, raw inverse-radius units with a textual confidence tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curvature {
    raw: i32,
    confidence: String,
}

impl Default for Curvature {
    fn default() -> Self {
        Self {
            raw: 0,
            confidence: "unavailable".to_owned(),
        }
    }
}

impl Curvature {
    pub fn new(raw: i32, confidence: String) -> Self {
        Self { raw, confidence }
    }

    pub fn raw(&self) -> i32 {
        self.raw
    }

    pub fn confidence(&self) -> &str {
        &self.confidence
    }

    /// Curvature carries no SI factor; the raw value is the value.
    pub fn value(&self) -> i32 {
        self.raw
    }
}

/// Steering wheel angle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteeringWheelAngle {
    raw: i32,
    confidence: i32,
}

impl SteeringWheelAngle {
    pub fn new(raw: i32, confidence: i32) -> Self {
        Self { raw, confidence }
    }

    pub fn raw(&self) -> i32 {
        self.raw
    }

    pub fn confidence(&self) -> i32 {
        self.confidence
    }

    pub fn value(&self) -> f64 {
        f64::from(self.raw) * STEERING_WHEEL_ANGLE_UNIT
    }
}

/// Altitude, centimeter raw units with a textual confidence tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Altitude {
    raw: i32,
    confidence: String,
}

impl Default for Altitude {
    fn default() -> Self {
        Self {
            raw: 0,
            confidence: "unavailable".to_owned(),
        }
    }
}

impl Altitude {
    pub fn new(raw: i32, confidence: String) -> Self {
        Self { raw, confidence }
    }

    pub fn raw(&self) -> i32 {
        self.raw
    }

    pub fn confidence(&self) -> &str {
        &self.confidence
    }

    /// Altitude in meters.
    pub fn value(&self) -> f64 {
        f64::from(self.raw) * ALTITUDE_UNIT
    }
}

/// Position confidence ellipse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionConfidence {
    pub semi_major: i32,
    pub semi_minor: i32,
    pub orientation: i32,
}

impl PositionConfidence {
    pub fn new(semi_major: i32, semi_minor: i32, orientation: i32) -> Self {
        Self {
            semi_major,
            semi_minor,
            orientation,
        }
    }
}

/// Mean Earth radius in meters, shared by the haversine distance and the
/// local tangent-plane projection.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// A timestamped WGS84 pose as carried by a CAM reference position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    delta_time: u16,
    latitude: i32,
    longitude: i32,
    heading: Heading,
    altitude: Altitude,
    confidence_ellipse: PositionConfidence,
}

impl Position {
    /// Build a position from raw wire fields.
    pub fn from_raw(
        delta_time: u16,
        latitude: i32,
        longitude: i32,
        heading: Heading,
        altitude: Altitude,
        confidence_ellipse: PositionConfidence,
    ) -> Self {
        Self {
            delta_time,
            latitude,
            longitude,
            heading,
            altitude,
            confidence_ellipse,
        }
    }

    /// Build a position from decimal degrees; everything else defaults.
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: (latitude / LATITUDE_UNIT) as i32,
            longitude: (longitude / LONGITUDE_UNIT) as i32,
            ..Self::default()
        }
    }

    pub fn raw_latitude(&self) -> i32 {
        self.latitude
    }

    pub fn raw_longitude(&self) -> i32 {
        self.longitude
    }

    /// Latitude in decimal degrees.
    pub fn latitude(&self) -> f64 {
        f64::from(self.latitude) * LATITUDE_UNIT
    }

    /// Longitude in decimal degrees.
    pub fn longitude(&self) -> f64 {
        f64::from(self.longitude) * LONGITUDE_UNIT
    }

    /// Generation delta time in seconds.
    pub fn time(&self) -> f64 {
        f64::from(self.delta_time) * TIME_UNIT
    }

    pub fn delta_time(&self) -> u16 {
        self.delta_time
    }

    pub fn heading(&self) -> &Heading {
        &self.heading
    }

    pub fn altitude(&self) -> &Altitude {
        &self.altitude
    }

    pub fn confidence_ellipse(&self) -> &PositionConfidence {
        &self.confidence_ellipse
    }

    /// Overwrite the pose with a predicted one, given in decimal degrees and
    /// radians. The generation delta time is left untouched; a prediction
    /// inherits the timestamp of the sample it was projected from.
    pub fn step(&mut self, latitude: f64, longitude: f64, heading: f64) {
        self.latitude = (latitude / LATITUDE_UNIT) as i32;
        self.longitude = (longitude / LONGITUDE_UNIT) as i32;
        self.heading = Heading::new((heading / HEADING_UNIT) as i32, 0);
    }

    /// Great-circle distance to `other` in meters on the mean-radius sphere.
    pub fn distance(&self, other: &Position) -> f64 {
        let phi1 = self.latitude().to_radians();
        let phi2 = other.latitude().to_radians();
        let d_phi = (other.latitude() - self.latitude()).to_radians();
        let d_lambda = (other.longitude() - self.longitude()).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());

        EARTH_RADIUS * c
    }
}

/// The per-message kinematics bundle from the high-frequency container.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub heading: Heading,
    pub speed: Speed,
    pub acceleration: Acceleration,
    pub yaw_rate: YawRate,
    pub steering_wheel_angle: SteeringWheelAngle,
    pub curvature: Curvature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_si_round_trip() {
        let p = Position::from_raw(
            200,
            450_000_090,
            70_000_000,
            Heading::new(0, 0),
            Altitude::default(),
            PositionConfidence::default(),
        );
        // Same raw fields, same derived SI values, bit for bit.
        let q = Position::from_raw(
            0,
            p.raw_latitude(),
            p.raw_longitude(),
            Heading::new(0, 0),
            Altitude::default(),
            PositionConfidence::default(),
        );
        assert_eq!(q.latitude(), p.latitude());
        assert_eq!(q.longitude(), p.longitude());

        // Degrees-based construction lands within one raw unit.
        let r = Position::from_degrees(p.latitude(), p.longitude());
        assert!((r.latitude() - p.latitude()).abs() < 1e-7);
        assert!((r.longitude() - p.longitude()).abs() < 1e-7);
    }

    #[test]
    fn si_accessors_apply_unit_constants() {
        let heading = Heading::new(900, 1);
        assert!((heading.value() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

        let speed = Speed::new(500, 2);
        assert!((speed.value() - 5.0).abs() < 1e-12);

        let accel = Acceleration::new("unavailable".into(), (10, 0), (0, 0), (0, 0));
        assert!((accel.longitudinal() - 1.0).abs() < 1e-12);

        let yaw = YawRate::new(250, "degSec-000-05".into());
        assert!((yaw.value() - 2.5).abs() < 1e-12);

        let wheel = SteeringWheelAngle::new(2, 0);
        assert!((wheel.value() - 3.0).abs() < 1e-12);

        let p = Position::from_raw(
            200,
            0,
            0,
            Heading::default(),
            Altitude::new(150, "alt-000-02".into()),
            PositionConfidence::default(),
        );
        assert!((p.altitude().value() - 1.5).abs() < 1e-12);
        assert!((p.time() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn missing_fields_default_to_unavailable() {
        assert_eq!(Acceleration::default().control(), "unavailable");
        assert_eq!(YawRate::default().confidence(), "unavailable");
        assert_eq!(Curvature::default().confidence(), "unavailable");
        assert_eq!(Altitude::default().confidence(), "unavailable");
        assert_eq!(Heading::default().raw(), 0);
        assert_eq!(Speed::default().raw(), 0);
    }

    #[test]
    fn haversine_is_zero_on_self_and_symmetric() {
        let a = Position::from_degrees(45.0, 7.0);
        let b = Position::from_degrees(45.001, 7.002);
        assert_eq!(a.distance(&a), 0.0);
        assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-6);
        // 0.001 deg of latitude is roughly 111 m.
        let c = Position::from_degrees(45.001, 7.0);
        let d = a.distance(&c);
        assert!((d - 111.0).abs() < 1.0, "distance was {d}");
    }

    #[test]
    fn step_truncates_toward_zero_and_keeps_time() {
        let mut p = Position::from_raw(
            400,
            450_000_000,
            70_000_000,
            Heading::new(123, 9),
            Altitude::default(),
            PositionConfidence::default(),
        );
        p.step(45.000018, 7.0000127, std::f64::consts::FRAC_PI_2);
        assert_eq!(p.delta_time(), 400);
        assert_eq!(p.heading().confidence(), 0);
        // Truncation toward zero costs at most one raw unit on each field.
        assert!((p.latitude() - 45.000018).abs() < 2e-7);
        assert!((p.longitude() - 7.0000127).abs() < 2e-7);
        assert!((p.heading().value() - std::f64::consts::FRAC_PI_2).abs() < 2e-3);
    }

    #[test]
    fn station_type_from_raw() {
        assert_eq!(StationType::from(5), StationType::PassengerCar);
        assert_eq!(StationType::from(15), StationType::RoadSideUnit);
        assert_eq!(StationType::from(0), StationType::Unknown);
        assert_eq!(StationType::from(42), StationType::Unknown);
    }
}
