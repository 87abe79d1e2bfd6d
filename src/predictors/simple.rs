//! Pure motion-model predictor.

use crate::geo;
use crate::station::PositionHistory;
use crate::types::{Kinematics, Position};

use super::{Predictor, PredictorCore};

/// Projects the last observed position through the CV/CTRA motion model and
/// converts it back to WGS84. No estimator state beyond the local frame.
#[derive(Clone, Debug, Default)]
pub struct SimplePredictor {
    core: PredictorCore,
}

impl Predictor for SimplePredictor {
    fn configure(&mut self) {}

    fn reset(&mut self) {
        self.core.n_iterations = 0;
    }

    fn predict(&mut self, positions: &PositionHistory, kinematics: &Kinematics) -> Position {
        if self.core.n_iterations == 0 {
            if let Some(front) = positions.front() {
                self.core.set_reference(front);
            }
        }
        self.core.n_iterations += 1;

        let Some(last) = positions.back() else {
            return self.core.last_prediction.clone();
        };

        let current = geo::to_cartesian(
            self.core.reference_position,
            (last.latitude(), last.longitude()),
        );
        let projection = self.core.project(positions, current, kinematics);
        let (lat, lon) = geo::from_cartesian(
            self.core.reference_position,
            (projection[0], projection[1]),
        );

        let mut prediction = last.clone();
        prediction.step(lat, lon, projection[2]);
        self.core.last_prediction = prediction.clone();
        prediction
    }

    fn last_prediction(&self) -> &Position {
        &self.core.last_prediction
    }

    fn clone_box(&self) -> Box<dyn Predictor> {
        Box::new(self.clone())
    }
}
