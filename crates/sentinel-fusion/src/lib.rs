//! # Sentinel Fusion
//!
//! The multi-sensor pipeline: temporal and spatial registration,
//! adaptive prioritization from environmental context, pairwise
//! cross-validation, feature fusion with signature matching, and an
//! unscented Kalman state estimator with calibrated confidence.
//!
//! ## Cycle
//! ```text
//! samples ─▶ temporal registration (50 ms gate)
//!         ─▶ spatial registration (rigid-body transforms)
//!         ─▶ adaptive priorities (environment × reliability)
//!         ─▶ cross-validation (weighted Pearson, τ = 5)
//!         ─▶ feature fusion + signature match (0.4/0.3/0.3)
//!         ─▶ UKF update ─▶ FusedState (emitted when confident)
//! ```
//!
//! Determinism: the pipeline holds no randomness; with identical sample
//! sequences and configuration the emitted `FusedState` sequence is
//! bit-identical.

mod calibration;
mod compensation;
mod confidence;
mod crossval;
mod environment;
mod features;
mod health;
mod pipeline;
mod prioritizer;
mod registration;
mod sample;
mod spectral;
mod ukf;

pub use calibration::{AlignmentCalibrator, CalibrationError, CalibrationResult};
pub use compensation::{CompensationFactors, EnvironmentalCompensator};
pub use confidence::ConfidenceScorer;
pub use crossval::{CrossValidator, CORRELATION_THRESHOLD};
pub use environment::{Atmosphere, EnvironmentContext, TerrainHint, Weather};
pub use features::{FeatureVector, Signature, SignatureLibrary, MATCH_ACCEPT_SCORE};
pub use health::SensorHealthTracker;
pub use pipeline::{FusionError, FusionPipeline, MIN_EMIT_CONFIDENCE};
pub use prioritizer::AdaptivePrioritizer;
pub use registration::{RegisteredSample, SpatialRegistrar, TemporalRegistrar, TEMPORAL_GATE};
pub use sample::{Pose, SensorReading, SensorSample};
pub use spectral::SpectralProcessor;
pub use ukf::UnscentedEstimator;
