//! Motion prediction engines.
//!
//! Three interchangeable predictors share one trait: a pure motion-model
//! projection ([`SimplePredictor`]), a pose-graph corrected projection
//! ([`FactorGraphPredictor`]), and an unscented Kalman filter
//! ([`UkfPredictor`]). Each station owns one predictor instance so the
//! reference frame, iteration counter, and filter state stay per-vehicle.

pub mod factor_graph;
pub mod simple;
pub mod ukf;

pub use factor_graph::FactorGraphPredictor;
pub use simple::SimplePredictor;
pub use ukf::UkfPredictor;

use crate::station::PositionHistory;
use crate::types::units::MEAN_DELTA_TIME;
use crate::types::{Kinematics, Position};

/// Yaw rates at or below this magnitude are handled by the constant-velocity
/// model; above it the vehicle is considered to be turning.
pub const YAW_RATE_THRESHOLD: f64 = 2.0;

/// A per-station motion prediction engine.
pub trait Predictor: Send {
    /// One-time setup after construction.
    fn configure(&mut self);

    /// Drop accumulated estimator state.
    fn reset(&mut self);

    /// Predict the next expected position from the bounded history and the
    /// current kinematics. Does not touch the history.
    fn predict(&mut self, positions: &PositionHistory, kinematics: &Kinematics) -> Position;

    /// The position returned by the most recent `predict` call.
    fn last_prediction(&self) -> &Position;

    /// Deep copy; cloned stations must not share estimator state.
    fn clone_box(&self) -> Box<dyn Predictor>;
}

impl Clone for Box<dyn Predictor> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// The predictor variants the factory knows about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PredictorKind {
    #[default]
    Simple,
    FactorGraph,
    Ukf,
}

/// Build a configured predictor of the requested kind.
pub fn create(kind: PredictorKind) -> Box<dyn Predictor> {
    let mut predictor: Box<dyn Predictor> = match kind {
        PredictorKind::Simple => Box::new(SimplePredictor::default()),
        PredictorKind::FactorGraph => Box::new(FactorGraphPredictor::default()),
        PredictorKind::Ukf => Box::new(UkfPredictor::default()),
    };
    predictor.configure();
    predictor
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MotionModel {
    ConstantVelocity,
    Ctra,
}

/// Pick the state-transition model for the current yaw rate. The boundary
/// value selects constant velocity.
pub(crate) fn select_model(yaw_rate: f64, force: bool) -> MotionModel {
    if force || yaw_rate.abs() > YAW_RATE_THRESHOLD {
        MotionModel::Ctra
    } else {
        MotionModel::ConstantVelocity
    }
}

/// Sign-preserving clamp keeping the CTRA closed form away from the 1/w²
/// singularity; zero clamps to the positive bound.
pub(crate) fn clamp_yaw_rate(w: f64) -> f64 {
    if w.abs() < YAW_RATE_THRESHOLD {
        if w < 0.0 {
            -YAW_RATE_THRESHOLD
        } else {
            YAW_RATE_THRESHOLD
        }
    } else {
        w
    }
}

/// Constant-velocity projection. The velocity term lands on both axes,
/// uncorrected for heading; scoring parity depends on this exact form.
pub(crate) fn apply_cv(x: f64, y: f64, theta: f64, v: f64, t: f64) -> [f64; 3] {
    [x + t * v, y + t * v, theta]
}

/// Constant turn rate and acceleration projection. The Δy closing term uses
/// `a·cos θ` rather than the symmetric `a·sin θ`; scoring parity depends on
/// this exact form.
pub(crate) fn apply_ctra(x: f64, y: f64, theta: f64, v: f64, a: f64, w: f64, t: f64) -> [f64; 3] {
    let w = clamp_yaw_rate(w);

    let (sin_th, cos_th) = theta.sin_cos();
    let (sin_proj, cos_proj) = (theta + w * t).sin_cos();

    let dx = (1.0 / (w * w))
        * ((v * w + a * w * t) * sin_proj + a * cos_proj - v * w * sin_th - a * cos_th);
    let dy = (1.0 / (w * w))
        * ((-v * w - a * w * t) * cos_proj + a * sin_proj + v * w * cos_th - a * cos_th);

    [x + dx, y + dy, theta + w * t]
}

/// Project a Cartesian pose through the selected motion model.
pub(crate) fn apply_model(
    position: (f64, f64),
    kinematics: &Kinematics,
    t: f64,
    force: bool,
) -> [f64; 3] {
    let theta = kinematics.heading.value();
    let v = kinematics.speed.value();
    let a = kinematics.acceleration.longitudinal();
    let w = kinematics.yaw_rate.value();

    match select_model(w, force) {
        MotionModel::ConstantVelocity => apply_cv(position.0, position.1, theta, v, t),
        MotionModel::Ctra => apply_ctra(position.0, position.1, theta, v, a, w, t),
    }
}

/// State every predictor carries: the last prediction, the anchor of the
/// local Cartesian frame, and the call counter driving rebuild cycles.
#[derive(Clone, Debug, Default)]
pub(crate) struct PredictorCore {
    pub last_prediction: Position,
    pub reference_position: (f64, f64),
    pub reference_time: f64,
    pub n_iterations: u32,
}

impl PredictorCore {
    pub fn set_reference(&mut self, position: &Position) {
        self.reference_position = (position.latitude(), position.longitude());
        self.reference_time = position.time();
    }

    /// Elapsed time to project over: the difference of the two most recent
    /// sample times when a previous sample exists, otherwise the time since
    /// the reference. A zero step falls back to the nominal CAM period.
    pub fn time_step(&self, positions: &PositionHistory) -> f64 {
        let mut t = match positions.back() {
            Some(last) => last.time() - self.reference_time,
            None => 0.0,
        };
        if let Some(prev) = positions.iter().rev().nth(1) {
            t -= prev.time() - self.reference_time;
        }
        if t == 0.0 {
            MEAN_DELTA_TIME
        } else {
            t
        }
    }

    /// Motion-model projection of a Cartesian pose over the history time
    /// step.
    pub fn project(
        &self,
        positions: &PositionHistory,
        position: (f64, f64),
        kinematics: &Kinematics,
    ) -> [f64; 3] {
        let t = self.time_step(positions);
        apply_model(position, kinematics, t, false)
    }
}
