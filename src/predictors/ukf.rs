//! Unscented Kalman filter predictor.
//!
//! State vector `[x, y, θ, v, a, ω]` in the station's local Cartesian
//! frame. The process model is the shared CTRA closed form; the measurement
//! is the current pose `[x, y, θ]` (identity on those components, zero on
//! the rest). The filter state persists across calls and is corrected
//! toward each observed pose.

use log::warn;
use nalgebra::{Cholesky, SMatrix, SVector};

use crate::geo;
use crate::station::PositionHistory;
use crate::types::{Kinematics, Position};

use super::{apply_ctra, clamp_yaw_rate, Predictor, PredictorCore};

const STATE_DIM: usize = 6;
const SIGMA_COUNT: usize = 2 * STATE_DIM + 1;

const ALPHA: f64 = 0.5;
const BETA: f64 = 2.0;
const KAPPA: f64 = 0.0;

type StateVec = SVector<f64, STATE_DIM>;
type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

/// CTRA state transition over `dt`.
fn process_model(state: &StateVec, dt: f64) -> StateVec {
    let [x, y, theta, v, a, w] = [state[0], state[1], state[2], state[3], state[4], state[5]];
    let projected = apply_ctra(x, y, theta, v, a, w, dt);
    StateVec::from([
        projected[0],
        projected[1],
        projected[2],
        v + a * dt,
        a,
        clamp_yaw_rate(w),
    ])
}

/// Pose measurement: identity on x, y, θ.
fn measurement_model(state: &StateVec) -> StateVec {
    StateVec::from([state[0], state[1], state[2], 0.0, 0.0, 0.0])
}

#[derive(Clone, Debug)]
struct UnscentedFilter {
    state: StateVec,
    covariance: StateMat,
    process_noise: StateMat,
    measurement_noise: StateMat,
    lambda: f64,
    weights_mean: [f64; SIGMA_COUNT],
    weights_cov: [f64; SIGMA_COUNT],
}

impl Default for UnscentedFilter {
    fn default() -> Self {
        let n = STATE_DIM as f64;
        let lambda = ALPHA * ALPHA * (n + KAPPA) - n;

        let mut weights_mean = [1.0 / (2.0 * (n + lambda)); SIGMA_COUNT];
        let mut weights_cov = weights_mean;
        weights_mean[0] = lambda / (n + lambda);
        weights_cov[0] = lambda / (n + lambda) + (1.0 - ALPHA * ALPHA + BETA);

        Self {
            state: StateVec::zeros(),
            covariance: StateMat::identity(),
            process_noise: StateMat::identity(),
            measurement_noise: StateMat::identity(),
            lambda,
            weights_mean,
            weights_cov,
        }
    }
}

impl UnscentedFilter {
    /// Sigma points from the current state and covariance via Cholesky of
    /// `(n + λ)·P`.
    fn sigma_points(&self) -> [StateVec; SIGMA_COUNT] {
        let mut sigmas = [StateVec::zeros(); SIGMA_COUNT];

        let scale = STATE_DIM as f64 + self.lambda;
        let scaled = self.covariance * scale;
        let l = match Cholesky::new(scaled) {
            Some(chol) => chol.l(),
            None => {
                warn!("sigma-point Cholesky failed, spreading with identity");
                StateMat::identity()
            }
        };

        sigmas[0] = self.state;
        for i in 0..STATE_DIM {
            let offset: StateVec = l.column(i).into();
            sigmas[i + 1] = self.state + offset;
            sigmas[i + 1 + STATE_DIM] = self.state - offset;
        }
        sigmas
    }

    fn predict(&mut self, dt: f64) {
        let mut propagated = self.sigma_points();
        for sigma in propagated.iter_mut() {
            *sigma = process_model(sigma, dt);
        }

        let mut mean = StateVec::zeros();
        for (i, sigma) in propagated.iter().enumerate() {
            mean += sigma * self.weights_mean[i];
        }

        let mut covariance = StateMat::zeros();
        for (i, sigma) in propagated.iter().enumerate() {
            let diff = sigma - mean;
            covariance += (diff * diff.transpose()) * self.weights_cov[i];
        }

        self.state = mean;
        self.covariance = covariance + self.process_noise;
    }

    /// Correct the state with a pose measurement; returns the updated state.
    fn update(&mut self, measurement: StateVec) -> StateVec {
        let sigmas = self.sigma_points();

        let mut z_sigmas = [StateVec::zeros(); SIGMA_COUNT];
        for (i, sigma) in sigmas.iter().enumerate() {
            z_sigmas[i] = measurement_model(sigma);
        }

        let mut z_pred = StateVec::zeros();
        for (i, z) in z_sigmas.iter().enumerate() {
            z_pred += z * self.weights_mean[i];
        }

        let mut innovation_cov = self.measurement_noise;
        for (i, z) in z_sigmas.iter().enumerate() {
            let diff = z - z_pred;
            innovation_cov += (diff * diff.transpose()) * self.weights_cov[i];
        }

        let mut cross_cov = StateMat::zeros();
        for i in 0..SIGMA_COUNT {
            let x_diff = sigmas[i] - self.state;
            let z_diff = z_sigmas[i] - z_pred;
            cross_cov += (x_diff * z_diff.transpose()) * self.weights_cov[i];
        }

        let Some(innovation_inv) = innovation_cov.try_inverse() else {
            warn!("singular innovation covariance, skipping measurement update");
            return self.state;
        };
        let gain = cross_cov * innovation_inv;

        self.state += gain * (measurement - z_pred);
        self.covariance -= gain * innovation_cov * gain.transpose();

        // Keep the covariance symmetric against accumulation drift.
        let transposed = self.covariance.transpose();
        self.covariance = (self.covariance + transposed) * 0.5;

        self.state
    }
}

/// Predictor wrapping the unscented filter.
#[derive(Clone, Debug, Default)]
pub struct UkfPredictor {
    core: PredictorCore,
    filter: UnscentedFilter,
}

impl Predictor for UkfPredictor {
    fn configure(&mut self) {
        self.filter = UnscentedFilter::default();
    }

    // Reset is not provided for this variant; the filter state simply keeps
    // integrating.
    fn reset(&mut self) {}

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
        let dt = self.core.time_step(positions);

        let observed = StateVec::from([
            current.0,
            current.1,
            kinematics.heading.value(),
            kinematics.speed.value(),
            kinematics.acceleration.longitudinal(),
            kinematics.yaw_rate.value(),
        ]);

        self.filter.predict(dt);
        let estimate = self.filter.update(measurement_model(&observed));

        let (lat, lon) = geo::from_cartesian(
            self.core.reference_position,
            (estimate[0], estimate[1]),
        );

        let mut prediction = last.clone();
        prediction.step(lat, lon, estimate[2]);
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
