//! Per-station kinematic state.
//!
//! A station is a vehicle or road-side unit identified by its ETSI station
//! id. The detector keeps one [`StationState`] per station: the latest
//! kinematics, a bounded history of reference positions, and a dedicated
//! predictor instance.

use std::collections::VecDeque;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::QualityError;
use crate::predictors::{self, Predictor, PredictorKind};
use crate::types::{Kinematics, Position, StationType};

/// Bound on the per-station position history.
pub const MAX_POSITIONS: usize = 16;

/// The decoded content of a single CAM, as handed to the core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StationReading {
    pub station_id: u32,
    pub station_type: StationType,
    pub position: Position,
    pub kinematics: Kinematics,
    pub drive_direction: String,
    pub curvature_calculation_mode: String,
}

/// Insertion-ordered bounded buffer of the most recent positions; the
/// oldest entry is evicted on overflow. Iteration runs oldest to newest.
#[derive(Clone, Debug, Default)]
pub struct PositionHistory {
    buf: VecDeque<Position>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self {
            buf: VecDeque::with_capacity(MAX_POSITIONS),
        }
    }

    pub fn push(&mut self, position: Position) {
        if self.buf.len() == MAX_POSITIONS {
            self.buf.pop_front();
        }
        self.buf.push_back(position);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Oldest retained position.
    pub fn front(&self) -> Option<&Position> {
        self.buf.front()
    }

    /// Most recent position.
    pub fn back(&self) -> Option<&Position> {
        self.buf.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Position> {
        self.buf.iter()
    }
}

/// Everything the detector knows about one station.
pub struct StationState {
    station_id: u32,
    station_type: StationType,
    positions: PositionHistory,
    last_position: Position,
    kinematics: Kinematics,
    drive_direction: String,
    curvature_calculation_mode: String,
    predictor: Box<dyn Predictor>,
}

impl StationState {
    /// Register a station from its first reading, using the default
    /// predictor variant.
    pub fn new(reading: &StationReading) -> Self {
        Self::with_predictor(reading, PredictorKind::default())
    }

    pub fn with_predictor(reading: &StationReading, kind: PredictorKind) -> Self {
        let mut positions = PositionHistory::new();
        positions.push(reading.position.clone());

        Self {
            station_id: reading.station_id,
            station_type: reading.station_type,
            positions,
            last_position: reading.position.clone(),
            kinematics: reading.kinematics.clone(),
            drive_direction: reading.drive_direction.clone(),
            curvature_calculation_mode: reading.curvature_calculation_mode.clone(),
            predictor: predictors::create(kind),
        }
    }

    /// Absorb a newer reading from the same station: its position enters
    /// the history and its kinematics replace the current bundle. A reading
    /// from a different station leaves the state untouched.
    pub fn update(&mut self, reading: &StationReading) -> Result<(), QualityError> {
        if self.station_id != reading.station_id {
            warn!(
                "update for station {} reached station {}",
                reading.station_id, self.station_id
            );
            return Err(QualityError::IdentityMismatch {
                expected: self.station_id,
                got: reading.station_id,
            });
        }

        self.positions.push(reading.position.clone());
        self.last_position = reading.position.clone();
        self.kinematics = reading.kinematics.clone();
        self.drive_direction = reading.drive_direction.clone();
        self.curvature_calculation_mode = reading.curvature_calculation_mode.clone();

        Ok(())
    }

    /// Push the predictor's last prediction as a synthetic observation.
    /// Used when an incoming reading is rejected as implausible, so the
    /// history keeps moving.
    pub fn update_with_prediction(&mut self) {
        let prediction = self.predictor.last_prediction().clone();
        self.kinematics.heading = *prediction.heading();
        self.last_position = prediction.clone();
        self.positions.push(prediction);
    }

    /// Predict the next expected position. Mutates only the predictor's
    /// internal state, never the history.
    pub fn predict_next_position(&mut self) -> Position {
        self.predictor.predict(&self.positions, &self.kinematics)
    }

    pub fn size_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn station_id(&self) -> u32 {
        self.station_id
    }

    pub fn station_type(&self) -> StationType {
        self.station_type
    }

    pub fn current_position(&self) -> &Position {
        &self.last_position
    }

    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    pub fn drive_direction(&self) -> &str {
        &self.drive_direction
    }

    pub fn curvature_calculation_mode(&self) -> &str {
        &self.curvature_calculation_mode
    }
}

impl Clone for StationState {
    fn clone(&self) -> Self {
        Self {
            station_id: self.station_id,
            station_type: self.station_type,
            positions: self.positions.clone(),
            last_position: self.last_position.clone(),
            kinematics: self.kinematics.clone(),
            drive_direction: self.drive_direction.clone(),
            curvature_calculation_mode: self.curvature_calculation_mode.clone(),
            predictor: self.predictor.clone_box(),
        }
    }
}

impl std::fmt::Debug for StationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationState")
            .field("station_id", &self.station_id)
            .field("station_type", &self.station_type)
            .field("positions", &self.positions.len())
            .field("last_position", &self.last_position)
            .finish()
    }
}
