//! Unscented state estimator
//!
//! Nine-dimensional state: position, velocity, and attitude error
//! (small-angle, radians). Measurements are the fused position and the
//! attitude residual against the current reference quaternion. Merwe
//! sigma points; fully deterministic.

use nalgebra::{Cholesky, SMatrix, SVector, UnitQuaternion, Vector3};

use sentinel_core::clock::Nanos;
use sentinel_core::estimate::STATE_DIM;

const N: usize = STATE_DIM;
const MEAS_DIM: usize = 6;
const SIGMA_COUNT: usize = 2 * N + 1;

const ALPHA: f64 = 0.3;
const BETA: f64 = 2.0;
const KAPPA: f64 = 0.0;

type StateVec = SVector<f64, N>;
type StateMat = SMatrix<f64, N, N>;
type MeasVec = SVector<f64, MEAS_DIM>;
type MeasMat = SMatrix<f64, MEAS_DIM, MEAS_DIM>;

pub struct UnscentedEstimator {
    x: StateVec,
    p: StateMat,
    orientation: UnitQuaternion<f64>,
    process_noise: StateMat,
    measurement_noise: MeasMat,
    last_update_ns: Option<Nanos>,
    lambda: f64,
    weights_mean: [f64; SIGMA_COUNT],
    weights_cov: [f64; SIGMA_COUNT],
}

impl UnscentedEstimator {
    pub fn new() -> Self {
        let lambda = ALPHA * ALPHA * (N as f64 + KAPPA) - N as f64;
        let mut weights_mean = [0.0; SIGMA_COUNT];
        let mut weights_cov = [0.0; SIGMA_COUNT];
        weights_mean[0] = lambda / (N as f64 + lambda);
        weights_cov[0] = weights_mean[0] + (1.0 - ALPHA * ALPHA + BETA);
        for i in 1..SIGMA_COUNT {
            weights_mean[i] = 1.0 / (2.0 * (N as f64 + lambda));
            weights_cov[i] = weights_mean[i];
        }

        Self {
            x: StateVec::zeros(),
            p: StateMat::identity() * 10.0,
            orientation: UnitQuaternion::identity(),
            process_noise: StateMat::identity() * 1e-3,
            measurement_noise: MeasMat::identity() * 1e-2,
            last_update_ns: None,
            lambda,
            weights_mean,
            weights_cov,
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x[0], self.x[1], self.x[2])
    }

    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.x[3], self.x[4], self.x[5])
    }

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.orientation
    }

    pub fn covariance(&self) -> StateMat {
        self.p
    }

    /// One predict + update step against the fused measurement.
    pub fn step(
        &mut self,
        timestamp_ns: Nanos,
        measured_position: Vector3<f64>,
        measured_orientation: UnitQuaternion<f64>,
    ) {
        let dt = match self.last_update_ns {
            Some(prev) => (timestamp_ns.saturating_sub(prev)) as f64 / 1e9,
            None => {
                // First sight: adopt the measurement directly.
                self.x[0] = measured_position.x;
                self.x[1] = measured_position.y;
                self.x[2] = measured_position.z;
                self.orientation = measured_orientation;
                self.last_update_ns = Some(timestamp_ns);
                return;
            }
        };
        self.last_update_ns = Some(timestamp_ns);

        self.predict(dt);

        let residual = (self.orientation.inverse() * measured_orientation).scaled_axis();
        let mut z = MeasVec::zeros();
        z[0] = measured_position.x;
        z[1] = measured_position.y;
        z[2] = measured_position.z;
        z[3] = residual.x;
        z[4] = residual.y;
        z[5] = residual.z;
        self.update(&z);

        // Fold the corrected attitude error back into the reference
        // quaternion and re-zero the error states.
        let err = Vector3::new(self.x[6], self.x[7], self.x[8]);
        self.orientation *= UnitQuaternion::from_scaled_axis(err);
        self.x[6] = 0.0;
        self.x[7] = 0.0;
        self.x[8] = 0.0;
    }

    fn predict(&mut self, dt: f64) {
        let sigmas = self.sigma_points();
        let propagated: Vec<StateVec> = sigmas
            .iter()
            .map(|s| {
                let mut out = *s;
                out[0] += s[3] * dt;
                out[1] += s[4] * dt;
                out[2] += s[5] * dt;
                out
            })
            .collect();

        let mut mean = StateVec::zeros();
        for (w, s) in self.weights_mean.iter().zip(&propagated) {
            mean += s * *w;
        }
        let mut cov = self.process_noise * dt.max(1e-6);
        for (w, s) in self.weights_cov.iter().zip(&propagated) {
            let d = s - mean;
            cov += d * d.transpose() * *w;
        }
        self.x = mean;
        self.p = cov;
    }

    fn update(&mut self, z: &MeasVec) {
        let sigmas = self.sigma_points();
        let observed: Vec<MeasVec> = sigmas.iter().map(|s| Self::observe(s)).collect();

        let mut z_mean = MeasVec::zeros();
        for (w, s) in self.weights_mean.iter().zip(&observed) {
            z_mean += s * *w;
        }

        let mut s_cov = self.measurement_noise;
        let mut cross = SMatrix::<f64, N, MEAS_DIM>::zeros();
        for ((w, sigma), obs) in self.weights_cov.iter().zip(&sigmas).zip(&observed) {
            let dz = obs - z_mean;
            let dx = sigma - self.x;
            s_cov += dz * dz.transpose() * *w;
            cross += dx * dz.transpose() * *w;
        }

        let Some(s_inv) = s_cov.try_inverse() else {
            return;
        };
        let gain = cross * s_inv;
        self.x += gain * (z - z_mean);
        self.p -= gain * s_cov * gain.transpose();
    }

    /// h(x): position plus attitude error.
    fn observe(state: &StateVec) -> MeasVec {
        let mut z = MeasVec::zeros();
        z[0] = state[0];
        z[1] = state[1];
        z[2] = state[2];
        z[3] = state[6];
        z[4] = state[7];
        z[5] = state[8];
        z
    }

    fn sigma_points(&self) -> Vec<StateVec> {
        let scaled = self.p * (N as f64 + self.lambda);
        let root = Cholesky::new(scaled)
            .or_else(|| Cholesky::new(scaled + StateMat::identity() * 1e-9))
            .map(|c| c.l())
            .unwrap_or_else(|| StateMat::identity() * 1e-4);

        let mut sigmas = Vec::with_capacity(SIGMA_COUNT);
        sigmas.push(self.x);
        for i in 0..N {
            let column = root.column(i).into_owned();
            sigmas.push(self.x + column);
            sigmas.push(self.x - column);
        }
        sigmas
    }
}

impl Default for UnscentedEstimator {
    fn default() -> Self {
        Self::new()
    }
}
