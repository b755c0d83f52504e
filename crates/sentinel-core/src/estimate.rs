//! Fused platform state estimate
//!
//! Output of the fusion pipeline, consumed by navigation and mission
//! subscribers. Immutable once published.

use std::collections::BTreeMap;

use nalgebra::{SMatrix, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::clock::Nanos;
use crate::sensor::SensorKind;

/// Dimension of the kinematic state tracked by the estimator:
/// position (3) + velocity (3) + attitude error (3).
pub const STATE_DIM: usize = 9;

/// Target classification emitted alongside the kinematic estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetClass {
    /// No signature match above the acceptance score.
    Unknown,
    /// Matched a known military signature.
    Military,
    /// Matched a known civilian signature.
    Civilian,
}

/// One fused estimate of platform kinematics and target classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedState {
    /// Reference timestamp shared by every sample in the fusion cycle.
    pub timestamp_ns: Nanos,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
    pub classification: TargetClass,
    /// Per-sensor combined confidence after cross-validation penalties.
    pub per_sensor_confidence: BTreeMap<SensorKind, f32>,
    /// Calibrated overall confidence in [0, 1].
    pub fusion_confidence: f32,
    /// State covariance of the unscented Kalman estimator.
    pub uncertainty_covariance: SMatrix<f64, STATE_DIM, STATE_DIM>,
}

impl FusedState {
    /// Confidence recorded for one sensor kind, 0.0 when the sensor did
    /// not contribute to this cycle.
    pub fn confidence_for(&self, kind: SensorKind) -> f32 {
        self.per_sensor_confidence.get(&kind).copied().unwrap_or(0.0)
    }
}
