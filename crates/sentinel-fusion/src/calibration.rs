//! Sensor alignment calibration
//!
//! Orthogonal Procrustes (Kabsch) solution for the rotation between a
//! sensor and the reference, translation recovered from centroids.
//! Success requires confidence above 0.8, with
//! `confidence = 1 − min(1, error / mean_reference_norm)`.

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use thiserror::Error;

/// Synchronized position pairs required per sensor.
pub const MIN_CALIBRATION_SAMPLES: usize = 10;

const SUCCESS_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("need at least {MIN_CALIBRATION_SAMPLES} point pairs, got {0}")]
    InsufficientSamples(usize),
    #[error("reference and sensor sample counts differ")]
    MismatchedSamples,
    #[error("degenerate point configuration")]
    Degenerate,
}

#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// Mean residual after applying the recovered transform, meters.
    pub residual_error: f64,
    pub confidence: f64,
}

impl CalibrationResult {
    pub fn success(&self) -> bool {
        self.confidence > SUCCESS_CONFIDENCE
    }

    /// The sensor-to-reference rigid transform.
    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_rotation_matrix(&self.rotation),
        )
    }
}

pub struct AlignmentCalibrator;

impl AlignmentCalibrator {
    /// Solve `reference ≈ R · sensor + t` from synchronized samples.
    pub fn solve(
        reference: &[Vector3<f64>],
        sensor: &[Vector3<f64>],
    ) -> Result<CalibrationResult, CalibrationError> {
        if reference.len() != sensor.len() {
            return Err(CalibrationError::MismatchedSamples);
        }
        if reference.len() < MIN_CALIBRATION_SAMPLES {
            return Err(CalibrationError::InsufficientSamples(reference.len()));
        }

        let n = reference.len() as f64;
        let ref_centroid: Vector3<f64> = reference.iter().sum::<Vector3<f64>>() / n;
        let sen_centroid: Vector3<f64> = sensor.iter().sum::<Vector3<f64>>() / n;

        // Cross-covariance of the centered point sets.
        let mut h = Matrix3::zeros();
        for (r, s) in reference.iter().zip(sensor) {
            h += (s - sen_centroid) * (r - ref_centroid).transpose();
        }

        let svd = h.svd(true, true);
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(CalibrationError::Degenerate);
        };
        let v = v_t.transpose();
        let mut d = Matrix3::identity();
        // Guard against a reflection solution.
        if (v * u.transpose()).determinant() < 0.0 {
            d[(2, 2)] = -1.0;
        }
        let rotation_matrix = v * d * u.transpose();
        let rotation = Rotation3::from_matrix_unchecked(rotation_matrix);

        let translation = ref_centroid - rotation_matrix * sen_centroid;

        let residual_error = reference
            .iter()
            .zip(sensor)
            .map(|(r, s)| (r - (rotation_matrix * s + translation)).norm())
            .sum::<f64>()
            / n;

        let mean_reference_norm = reference.iter().map(Vector3::norm).sum::<f64>() / n;
        let confidence = if mean_reference_norm > 0.0 {
            1.0 - (residual_error / mean_reference_norm).min(1.0)
        } else {
            0.0
        };

        Ok(CalibrationResult {
            rotation,
            translation,
            residual_error,
            confidence,
        })
    }
}
