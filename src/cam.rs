//! Decoded form of the ETSI CAM JSON payload.
//!
//! Every field is optional on the wire: missing numeric fields decode to 0
//! and missing confidence strings to `"unavailable"`. Range violations on
//! the reference position are rejected at this boundary so the core only
//! ever sees valid readings.

use serde::{Deserialize, Serialize};

use crate::error::QualityError;
use crate::station::StationReading;
use crate::types::{
    Acceleration, Altitude, Curvature, Heading, Kinematics, Position, PositionConfidence, Speed,
    StationType, SteeringWheelAngle, YawRate,
};

const MAX_LATITUDE_RAW: i32 = 900_000_000;
const MAX_LONGITUDE_RAW: i32 = 1_800_000_000;

fn unavailable() -> String {
    "unavailable".to_owned()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CamMessage {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub cam: Cam,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "stationID", default)]
    pub station_id: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cam {
    #[serde(default)]
    pub generation_delta_time: u16,
    #[serde(default)]
    pub cam_parameters: CamParameters,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CamParameters {
    #[serde(default)]
    pub basic_container: BasicContainer,
    #[serde(default)]
    pub high_frequency_container: HighFrequencyContainer,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicContainer {
    #[serde(default)]
    pub station_type: i32,
    #[serde(default)]
    pub reference_position: ReferencePosition,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencePosition {
    #[serde(default)]
    pub latitude: i32,
    #[serde(default)]
    pub longitude: i32,
    #[serde(default)]
    pub altitude: AltitudeField,
    #[serde(default)]
    pub position_confidence_ellipse: ConfidenceEllipse,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AltitudeField {
    #[serde(default)]
    pub altitude_value: i32,
    #[serde(default = "unavailable")]
    pub altitude_confidence: String,
}

impl Default for AltitudeField {
    fn default() -> Self {
        Self {
            altitude_value: 0,
            altitude_confidence: unavailable(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceEllipse {
    #[serde(default)]
    pub semi_major_confidence: i32,
    #[serde(default)]
    pub semi_minor_confidence: i32,
    #[serde(default)]
    pub semi_major_orientation: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighFrequencyContainer {
    #[serde(default)]
    pub basic_vehicle_container_high_frequency: VehicleContainerHighFrequency,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleContainerHighFrequency {
    #[serde(default)]
    pub heading: HeadingField,
    #[serde(default)]
    pub speed: SpeedField,
    #[serde(default)]
    pub drive_direction: String,
    #[serde(default)]
    pub longitudinal_acceleration: LongitudinalAcceleration,
    #[serde(default)]
    pub lateral_acceleration: LateralAcceleration,
    #[serde(default)]
    pub vertical_acceleration: VerticalAcceleration,
    #[serde(default = "unavailable")]
    pub acceleration_control: String,
    #[serde(default)]
    pub yaw_rate: YawRateField,
    #[serde(default)]
    pub steering_wheel_angle: SteeringWheelAngleField,
    #[serde(default)]
    pub curvature: CurvatureField,
    #[serde(default)]
    pub curvature_calculation_mode: String,
}

impl Default for VehicleContainerHighFrequency {
    fn default() -> Self {
        Self {
            heading: HeadingField::default(),
            speed: SpeedField::default(),
            drive_direction: String::new(),
            longitudinal_acceleration: LongitudinalAcceleration::default(),
            lateral_acceleration: LateralAcceleration::default(),
            vertical_acceleration: VerticalAcceleration::default(),
            acceleration_control: unavailable(),
            yaw_rate: YawRateField::default(),
            steering_wheel_angle: SteeringWheelAngleField::default(),
            curvature: CurvatureField::default(),
            curvature_calculation_mode: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadingField {
    #[serde(default)]
    pub heading_value: i32,
    #[serde(default)]
    pub heading_confidence: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedField {
    #[serde(default)]
    pub speed_value: i32,
    #[serde(default)]
    pub speed_confidence: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongitudinalAcceleration {
    #[serde(default)]
    pub longitudinal_acceleration_value: i32,
    #[serde(default)]
    pub longitudinal_acceleration_confidence: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LateralAcceleration {
    #[serde(default)]
    pub lateral_acceleration_value: i32,
    #[serde(default)]
    pub lateral_acceleration_confidence: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerticalAcceleration {
    #[serde(default)]
    pub vertical_acceleration_value: i32,
    #[serde(default)]
    pub vertical_acceleration_confidence: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YawRateField {
    #[serde(default)]
    pub yaw_rate_value: i32,
    #[serde(default = "unavailable")]
    pub yaw_rate_confidence: String,
}

impl Default for YawRateField {
    fn default() -> Self {
        Self {
            yaw_rate_value: 0,
            yaw_rate_confidence: unavailable(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteeringWheelAngleField {
    #[serde(default)]
    pub steering_wheel_angle_value: i32,
    #[serde(default)]
    pub steering_wheel_angle_confidence: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvatureField {
    #[serde(default)]
    pub curvature_value: i32,
    #[serde(default = "unavailable")]
    pub curvature_confidence: String,
}

impl Default for CurvatureField {
    fn default() -> Self {
        Self {
            curvature_value: 0,
            curvature_confidence: unavailable(),
        }
    }
}

/// Parse and validate a CAM payload.
pub fn decode(payload: &[u8]) -> Result<CamMessage, QualityError> {
    let message: CamMessage = serde_json::from_slice(payload)?;

    let position = &message.cam.cam_parameters.basic_container.reference_position;
    if position.latitude > MAX_LATITUDE_RAW || position.latitude < -MAX_LATITUDE_RAW {
        return Err(QualityError::OutOfRange("latitude"));
    }
    if position.longitude > MAX_LONGITUDE_RAW || position.longitude < -MAX_LONGITUDE_RAW {
        return Err(QualityError::OutOfRange("longitude"));
    }

    Ok(message)
}

impl From<&CamMessage> for StationReading {
    fn from(message: &CamMessage) -> Self {
        let basic = &message.cam.cam_parameters.basic_container;
        let high = &message
            .cam
            .cam_parameters
            .high_frequency_container
            .basic_vehicle_container_high_frequency;

        let heading = Heading::new(high.heading.heading_value, high.heading.heading_confidence);

        let position = Position::from_raw(
            message.cam.generation_delta_time,
            basic.reference_position.latitude,
            basic.reference_position.longitude,
            heading,
            Altitude::new(
                basic.reference_position.altitude.altitude_value,
                basic.reference_position.altitude.altitude_confidence.clone(),
            ),
            PositionConfidence::new(
                basic
                    .reference_position
                    .position_confidence_ellipse
                    .semi_major_confidence,
                basic
                    .reference_position
                    .position_confidence_ellipse
                    .semi_minor_confidence,
                basic
                    .reference_position
                    .position_confidence_ellipse
                    .semi_major_orientation,
            ),
        );

        let kinematics = Kinematics {
            heading,
            speed: Speed::new(high.speed.speed_value, high.speed.speed_confidence),
            acceleration: Acceleration::new(
                high.acceleration_control.clone(),
                (
                    high.longitudinal_acceleration.longitudinal_acceleration_value,
                    high.longitudinal_acceleration
                        .longitudinal_acceleration_confidence,
                ),
                (
                    high.lateral_acceleration.lateral_acceleration_value,
                    high.lateral_acceleration.lateral_acceleration_confidence,
                ),
                (
                    high.vertical_acceleration.vertical_acceleration_value,
                    high.vertical_acceleration.vertical_acceleration_confidence,
                ),
            ),
            yaw_rate: YawRate::new(
                high.yaw_rate.yaw_rate_value,
                high.yaw_rate.yaw_rate_confidence.clone(),
            ),
            steering_wheel_angle: SteeringWheelAngle::new(
                high.steering_wheel_angle.steering_wheel_angle_value,
                high.steering_wheel_angle.steering_wheel_angle_confidence,
            ),
            curvature: Curvature::new(
                high.curvature.curvature_value,
                high.curvature.curvature_confidence.clone(),
            ),
        };

        StationReading {
            station_id: message.header.station_id,
            station_type: StationType::from(basic.station_type),
            position,
            kinematics,
            drive_direction: high.drive_direction.clone(),
            curvature_calculation_mode: high.curvature_calculation_mode.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "header": { "protocolVersion": 2, "messageID": 2, "stationID": 1444 },
        "cam": {
            "generationDeltaTime": 200,
            "camParameters": {
                "basicContainer": {
                    "stationType": 5,
                    "referencePosition": {
                        "latitude": 450000090,
                        "longitude": 70000000,
                        "altitude": { "altitudeValue": 25000, "altitudeConfidence": "alt-000-02" },
                        "positionConfidenceEllipse": {
                            "semiMajorConfidence": 100,
                            "semiMinorConfidence": 50,
                            "semiMajorOrientation": 0
                        }
                    }
                },
                "highFrequencyContainer": {
                    "basicVehicleContainerHighFrequency": {
                        "heading": { "headingValue": 900, "headingConfidence": 10 },
                        "speed": { "speedValue": 500, "speedConfidence": 3 },
                        "driveDirection": "forward",
                        "longitudinalAcceleration": {
                            "longitudinalAccelerationValue": 5,
                            "longitudinalAccelerationConfidence": 2
                        },
                        "accelerationControl": "brakePedalEngaged",
                        "yawRate": { "yawRateValue": 120, "yawRateConfidence": "degSec-000-05" },
                        "steeringWheelAngle": {
                            "steeringWheelAngleValue": 12,
                            "steeringWheelAngleConfidence": 1
                        },
                        "curvature": { "curvatureValue": 30, "curvatureConfidence": "onePerMeter-0-0002" },
                        "curvatureCalculationMode": "yawRateUsed"
                    }
                }
            }
        }
    }"#;

    #[test]
    fn full_message_decodes() {
        let message = decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(message.header.station_id, 1444);
        assert_eq!(message.cam.generation_delta_time, 200);

        let reading = StationReading::from(&message);
        assert_eq!(reading.station_id, 1444);
        assert_eq!(reading.station_type, StationType::PassengerCar);
        assert_eq!(reading.position.raw_latitude(), 450_000_090);
        assert_eq!(reading.position.heading().raw(), 900);
        assert_eq!(reading.kinematics.speed.raw(), 500);
        assert_eq!(reading.kinematics.yaw_rate.confidence(), "degSec-000-05");
        assert_eq!(reading.kinematics.acceleration.control(), "brakePedalEngaged");
        assert_eq!(reading.drive_direction, "forward");
        assert_eq!(reading.curvature_calculation_mode, "yawRateUsed");
    }

    #[test]
    fn absent_fields_take_defaults() {
        let message = decode(br#"{ "header": { "stationID": 9 } }"#).unwrap();
        let reading = StationReading::from(&message);

        assert_eq!(reading.station_id, 9);
        assert_eq!(reading.station_type, StationType::Unknown);
        assert_eq!(reading.position.raw_latitude(), 0);
        assert_eq!(reading.position.altitude().confidence(), "unavailable");
        assert_eq!(reading.kinematics.speed.raw(), 0);
        assert_eq!(reading.kinematics.yaw_rate.confidence(), "unavailable");
        assert_eq!(reading.kinematics.acceleration.control(), "unavailable");
        assert_eq!(reading.kinematics.curvature.confidence(), "unavailable");
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = decode(b"{ not json").unwrap_err();
        assert!(matches!(err, QualityError::Decode(_)));
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let payload = r#"{
            "cam": { "camParameters": { "basicContainer": {
                "referencePosition": { "latitude": 900000001, "longitude": 0 }
            } } }
        }"#;
        let err = decode(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, QualityError::OutOfRange("latitude")));
    }

    #[test]
    fn out_of_range_longitude_is_rejected() {
        let payload = r#"{
            "cam": { "camParameters": { "basicContainer": {
                "referencePosition": { "latitude": 0, "longitude": -1800000001 }
            } } }
        }"#;
        let err = decode(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, QualityError::OutOfRange("longitude")));
    }
}
