//! Pose-graph corrected predictor.
//!
//! Keeps a nonlinear least-squares graph of 2D rigid transforms: a prior on
//! the first node and a between-factor per consecutive pair of history
//! samples. Each prediction appends an ephemeral node holding the
//! motion-model projection, constrains it softly to the current pose,
//! optimizes with Levenberg-Marquardt, reads the optimized pose back, and
//! removes the ephemeral node again.

use log::warn;
use nalgebra::{DMatrix, DVector};

use crate::geo;
use crate::station::PositionHistory;
use crate::types::units::MEAN_DELTA_TIME;
use crate::types::{Kinematics, Position};

use super::{apply_model, Predictor, PredictorCore};

/// Graph rebuild period: once the node counter reaches this, the graph is
/// rebuilt from the positions currently in the history.
const MAX_ITERATIONS: u32 = 8;

/// Diagonal sigma of both the prior and the between-factor noise models.
const NOISE_SIGMA: f64 = 1e-5;

const LM_MAX_ITERATIONS: usize = 100;
const LM_RELATIVE_ERROR_TOL: f64 = 1e-5;
const LM_ABSOLUTE_ERROR_TOL: f64 = 1e-12;

/// A 2D rigid transform.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose2 {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2 {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// `self ∘ other`: apply `other` in the frame of `self`.
    pub fn compose(&self, other: &Pose2) -> Pose2 {
        let (sin, cos) = self.theta.sin_cos();
        Pose2 {
            x: self.x + cos * other.x - sin * other.y,
            y: self.y + sin * other.x + cos * other.y,
            theta: wrap_angle(self.theta + other.theta),
        }
    }

    pub fn inverse(&self) -> Pose2 {
        let (sin, cos) = self.theta.sin_cos();
        Pose2 {
            x: -(cos * self.x + sin * self.y),
            y: -(-sin * self.x + cos * self.y),
            theta: wrap_angle(-self.theta),
        }
    }

    /// `self⁻¹ ∘ other`: the transform taking `self` to `other`.
    pub fn between(&self, other: &Pose2) -> Pose2 {
        self.inverse().compose(other)
    }
}

/// Normalize an angle to (-π, π].
fn wrap_angle(angle: f64) -> f64 {
    angle.sin().atan2(angle.cos())
}

#[derive(Clone, Debug)]
enum Factor {
    /// Pins a node to an absolute pose.
    Prior { key: usize, measured: Pose2 },
    /// Soft constraint on the relative transform from `key` to `base`.
    Between {
        key: usize,
        base: usize,
        measured: Pose2,
    },
}

impl Factor {
    /// Whitened residual of this factor under the given assignment.
    fn residual(&self, values: &[Pose2]) -> [f64; 3] {
        let d = match self {
            Factor::Prior { key, measured } => measured.between(&values[*key]),
            Factor::Between {
                key,
                base,
                measured,
            } => {
                let predicted = values[*key].between(&values[*base]);
                measured.between(&predicted)
            }
        };
        [
            d.x / NOISE_SIGMA,
            d.y / NOISE_SIGMA,
            wrap_angle(d.theta) / NOISE_SIGMA,
        ]
    }
}

#[derive(Clone, Debug, Default)]
struct PoseGraph {
    factors: Vec<Factor>,
}

impl PoseGraph {
    fn add_prior(&mut self, key: usize, measured: Pose2) {
        self.factors.push(Factor::Prior { key, measured });
    }

    fn add_between(&mut self, key: usize, base: usize, measured: Pose2) {
        self.factors.push(Factor::Between {
            key,
            base,
            measured,
        });
    }

    fn truncate(&mut self, len: usize) {
        self.factors.truncate(len);
    }

    fn residuals(&self, values: &[Pose2]) -> DVector<f64> {
        let mut r = DVector::zeros(3 * self.factors.len());
        for (i, factor) in self.factors.iter().enumerate() {
            let res = factor.residual(values);
            r[3 * i] = res[0];
            r[3 * i + 1] = res[1];
            r[3 * i + 2] = res[2];
        }
        r
    }

    fn error(&self, values: &[Pose2]) -> f64 {
        self.residuals(values).norm_squared()
    }

    fn numeric_jacobian(&self, values: &[Pose2]) -> DMatrix<f64> {
        const STEP: f64 = 1e-6;
        let rows = 3 * self.factors.len();
        let cols = 3 * values.len();
        let mut jacobian = DMatrix::zeros(rows, cols);
        let mut perturbed = values.to_vec();

        for col in 0..cols {
            let (node, axis) = (col / 3, col % 3);
            let original = component(&perturbed[node], axis);

            set_component(&mut perturbed[node], axis, original + STEP);
            let plus = self.residuals(&perturbed);
            set_component(&mut perturbed[node], axis, original - STEP);
            let minus = self.residuals(&perturbed);
            set_component(&mut perturbed[node], axis, original);

            for row in 0..rows {
                jacobian[(row, col)] = (plus[row] - minus[row]) / (2.0 * STEP);
            }
        }
        jacobian
    }

    /// Levenberg-Marquardt over all poses. Returns `None` when the solver
    /// fails or the relative error decrease never reaches the tolerance
    /// within the iteration cap.
    fn optimize(&self, initial: &[Pose2]) -> Option<Vec<Pose2>> {
        if initial.is_empty() {
            return Some(Vec::new());
        }

        let mut values = initial.to_vec();
        let mut error = self.error(&values);
        if !error.is_finite() {
            return None;
        }
        let mut lambda = 1e-5;

        for _ in 0..LM_MAX_ITERATIONS {
            if error < LM_ABSOLUTE_ERROR_TOL {
                return Some(values);
            }

            let residuals = self.residuals(&values);
            let jacobian = self.numeric_jacobian(&values);
            let jt = jacobian.transpose();
            let mut hessian = &jt * &jacobian;
            let gradient = &jt * &residuals;
            for i in 0..hessian.nrows() {
                hessian[(i, i)] += lambda * (1.0 + hessian[(i, i)]);
            }

            let delta = hessian.lu().solve(&(-&gradient))?;

            let mut candidate = values.clone();
            for (node, pose) in candidate.iter_mut().enumerate() {
                pose.x += delta[3 * node];
                pose.y += delta[3 * node + 1];
                pose.theta = wrap_angle(pose.theta + delta[3 * node + 2]);
            }

            let candidate_error = self.error(&candidate);
            if candidate_error.is_finite() && candidate_error < error {
                let decrease = (error - candidate_error) / error;
                values = candidate;
                error = candidate_error;
                lambda = (lambda * 0.1).max(1e-12);
                if decrease < LM_RELATIVE_ERROR_TOL {
                    return Some(values);
                }
            } else {
                lambda *= 10.0;
                if lambda > 1e10 {
                    return None;
                }
            }
        }

        None
    }
}

fn component(pose: &Pose2, axis: usize) -> f64 {
    match axis {
        0 => pose.x,
        1 => pose.y,
        _ => pose.theta,
    }
}

fn set_component(pose: &mut Pose2, axis: usize, value: f64) {
    match axis {
        0 => pose.x = value,
        1 => pose.y = value,
        _ => pose.theta = value,
    }
}

/// Predictor correcting the motion-model projection with a pose graph.
#[derive(Clone, Debug, Default)]
pub struct FactorGraphPredictor {
    core: PredictorCore,
    graph: PoseGraph,
    values: Vec<Pose2>,
}

impl FactorGraphPredictor {
    fn set_node(&mut self, key: usize, pose: Pose2) {
        if key < self.values.len() {
            self.values[key] = pose;
        } else {
            while self.values.len() < key {
                self.values.push(Pose2::default());
            }
            self.values.push(pose);
        }
    }

    fn node_xy(&self, position: &Position) -> (f64, f64) {
        geo::to_cartesian(
            self.core.reference_position,
            (position.latitude(), position.longitude()),
        )
    }

    /// The first node anchors the graph with heading zero; the prior added
    /// at configuration time pins it to the origin.
    fn insert_first_node(&mut self, position: &Position) {
        let (x, y) = self.node_xy(position);
        self.set_node(0, Pose2::new(x, y, 0.0));
    }

    fn insert_new_factor(&mut self, key: usize, curr: &Position, prev: &Position) {
        let (cx, cy) = self.node_xy(curr);
        let curr_pose = Pose2::new(cx, cy, curr.heading().value());
        self.set_node(key, curr_pose);

        let (px, py) = self.node_xy(prev);
        let prev_pose = Pose2::new(px, py, prev.heading().value());

        self.graph
            .add_between(key, key - 1, curr_pose.between(&prev_pose));
    }

    /// Rebuild nodes and between-factors from the whole history. Returns
    /// the index the next (ephemeral) node will take.
    fn build_full_graph(&mut self, positions: &PositionHistory) -> usize {
        let mut count = 0;
        let mut prev: Option<Position> = None;
        for position in positions.iter() {
            match &prev {
                None => self.insert_first_node(position),
                Some(p) => self.insert_new_factor(count, position, p),
            }
            prev = Some(position.clone());
            count += 1;
        }
        count
    }

    fn reset_graph(&mut self) {
        self.graph = PoseGraph::default();
        self.graph.add_prior(0, Pose2::default());
        self.values.clear();
    }
}

impl Predictor for FactorGraphPredictor {
    fn configure(&mut self) {
        self.reset_graph();
    }

    fn reset(&mut self) {
        self.reset_graph();
        self.core.n_iterations = 0;
    }

    fn predict(&mut self, positions: &PositionHistory, kinematics: &Kinematics) -> Position {
        // Not enough positions for any optimization: project through the
        // motion model from a frame anchored at the only sample.
        if positions.len() < 2 {
            let Some(actual) = positions.back() else {
                return self.core.last_prediction.clone();
            };
            let projection = apply_model((0.0, 0.0), kinematics, MEAN_DELTA_TIME, false);
            let anchor = (actual.latitude(), actual.longitude());
            let (lat, lon) = geo::from_cartesian(anchor, (projection[0], projection[1]));

            let mut prediction = actual.clone();
            prediction.step(lat, lon, projection[2]);
            self.core.last_prediction = prediction.clone();
            return prediction;
        }

        // Graph maintenance: build on first use, rebuild once the node
        // counter reaches the cap, otherwise append the newest sample.
        let next_key = if self.core.n_iterations == 0 {
            if let Some(front) = positions.front() {
                self.core.set_reference(front);
            }
            let key = self.build_full_graph(positions);
            self.core.n_iterations = 2;
            key
        } else if self.core.n_iterations >= MAX_ITERATIONS {
            self.reset_graph();
            if let Some(front) = positions.front() {
                self.core.set_reference(front);
            }
            let key = self.build_full_graph(positions);
            self.core.n_iterations = positions.len() as u32;
            key
        } else {
            let mut newest = positions.iter().rev();
            let (Some(last), Some(prev)) = (newest.next(), newest.next()) else {
                return self.core.last_prediction.clone();
            };
            let key = self.core.n_iterations as usize;
            self.insert_new_factor(key, last, prev);
            self.core.n_iterations += 1;
            key + 1
        };

        let Some(last) = positions.back() else {
            return self.core.last_prediction.clone();
        };
        let current = self.node_xy(last);
        let projection = self.core.project(positions, current, kinematics);

        // The projection enters the graph as an ephemeral node softly
        // constrained to the current pose.
        let predicted_pose = Pose2::new(projection[0], projection[1], projection[2]);
        let current_pose = Pose2::new(current.0, current.1, kinematics.heading.value());
        self.set_node(next_key, predicted_pose);
        self.graph
            .add_between(next_key, next_key - 1, predicted_pose.between(&current_pose));

        let optimized = self.graph.optimize(&self.values);

        let (lat, lon) = match optimized.as_ref().and_then(|values| values.get(next_key)) {
            Some(pose) => geo::from_cartesian(self.core.reference_position, (pose.x, pose.y)),
            None => {
                warn!("pose graph optimization did not converge; falling back to the motion-model projection");
                geo::from_cartesian(self.core.reference_position, (projection[0], projection[1]))
            }
        };

        // Remove the ephemeral node and its factor; an accepted reading
        // will enter the graph as a real node on the next call.
        self.graph.truncate(next_key);
        self.values.truncate(next_key);

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
