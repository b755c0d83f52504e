//! Fusion pipeline
//!
//! Owns the per-stage state and drives one cycle end-to-end. The
//! estimator always updates; the `FusedStateUpdated` event is emitted
//! only when the calibrated confidence clears the floor, so subscribers
//! never act on a cross-validation collapse.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::UnitQuaternion;
use thiserror::Error;
use tracing::debug;

use sentinel_core::clock::Nanos;
use sentinel_core::{
    Event, EventPayload, EventSink, FusedState, Priority, SensorKind, TargetClass,
};

use crate::calibration::{AlignmentCalibrator, CalibrationError, CalibrationResult};
use crate::compensation::EnvironmentalCompensator;
use crate::confidence::ConfidenceScorer;
use crate::crossval::CrossValidator;
use crate::environment::EnvironmentContext;
use crate::features::{FeatureVector, SignatureLibrary};
use crate::health::SensorHealthTracker;
use crate::prioritizer::AdaptivePrioritizer;
use crate::registration::{RegisteredSample, SpatialRegistrar, TemporalRegistrar};
use crate::sample::{SensorReading, SensorSample};
use crate::spectral::SpectralProcessor;
use crate::ukf::UnscentedEstimator;

/// Fusion confidence below which no state estimate is published.
pub const MIN_EMIT_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Error)]
pub enum FusionError {
    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
}

pub struct FusionPipeline {
    temporal: TemporalRegistrar,
    spatial: SpatialRegistrar,
    prioritizer: AdaptivePrioritizer,
    crossval: CrossValidator,
    scorer: ConfidenceScorer,
    health: SensorHealthTracker,
    estimator: UnscentedEstimator,
    library: SignatureLibrary,
    sink: Arc<dyn EventSink>,
    last_emitted_ns: Option<Nanos>,
    last_cycle_ns: Option<Nanos>,
}

impl FusionPipeline {
    pub fn new(library: SignatureLibrary, sink: Arc<dyn EventSink>) -> Self {
        Self {
            temporal: TemporalRegistrar::new(),
            spatial: SpatialRegistrar::new(),
            prioritizer: AdaptivePrioritizer::new(),
            crossval: CrossValidator::new(),
            scorer: ConfidenceScorer::new(),
            health: SensorHealthTracker::new(),
            estimator: UnscentedEstimator::new(),
            library,
            sink,
            last_emitted_ns: None,
            last_cycle_ns: None,
        }
    }

    /// Feed one sample into the temporal buffers.
    pub fn ingest(&mut self, sample: SensorSample) {
        self.health.observe_ok(sample.kind);
        self.sink.emit(Event::new(
            sample.sensor_id.clone(),
            sample.timestamp_ns,
            Priority::Normal,
            EventPayload::SensorDataUpdated {
                sensor_id: sample.sensor_id.clone(),
                sensor_kind: sample.kind,
                sample_timestamp_ns: sample.timestamp_ns,
            },
        ));
        self.temporal.ingest(sample);
    }

    /// Attribute a stream fault to a sensor kind (from the HIL layer or
    /// the error fabric).
    pub fn report_sensor_fault(&mut self, kind: SensorKind) {
        self.health.observe_fault(kind);
    }

    /// Apply the sensor recovery directive: weight × `factor` until
    /// `until_ns`, recalibration afterwards.
    pub fn penalize_sensor(&mut self, kind: SensorKind, factor: f64, until_ns: Nanos) {
        self.prioritizer.penalize(kind, factor, until_ns);
    }

    /// Kinds whose degradation window elapsed and are due recalibration.
    pub fn take_recalibration_due(&mut self) -> Vec<SensorKind> {
        self.prioritizer.take_recalibration_due()
    }

    /// Run the alignment calibrator for one sensor and install the
    /// resulting transform on success.
    pub fn calibrate(
        &mut self,
        kind: SensorKind,
        sensor_id: &str,
        reference_id: &str,
        reference_points: &[nalgebra::Vector3<f64>],
        sensor_points: &[nalgebra::Vector3<f64>],
        now_ns: Nanos,
    ) -> Result<CalibrationResult, FusionError> {
        let result = AlignmentCalibrator::solve(reference_points, sensor_points)?;
        if result.success() {
            self.spatial.set_transform(kind, result.isometry());
        }
        self.sink.emit(Event::new(
            sensor_id.to_string(),
            now_ns,
            Priority::Normal,
            EventPayload::SensorAlignmentComplete {
                sensor_id: sensor_id.to_string(),
                reference_id: reference_id.to_string(),
                residual_error: result.residual_error,
                confidence: result.confidence,
            },
        ));
        Ok(result)
    }

    pub fn set_transform(&mut self, kind: SensorKind, transform: nalgebra::Isometry3<f64>) {
        self.spatial.set_transform(kind, transform);
    }

    /// One full fusion cycle. Returns the new state estimate, emitted or
    /// not.
    pub fn run_cycle(
        &mut self,
        env: &EnvironmentContext,
        now_ns: Nanos,
    ) -> Option<FusedState> {
        // Stage A: temporal registration.
        let cycle = self.temporal.register_cycle();
        if cycle.is_empty() {
            return None;
        }

        // Stage B: spatial registration.
        let cycle: Vec<RegisteredSample> = cycle
            .into_iter()
            .map(|s| self.spatial.register(s))
            .collect();
        let reference_ns = cycle[0].reference_ns;

        // No new data since the last cycle; re-fusing the same samples
        // would double-count them in the validation windows.
        if self.last_cycle_ns == Some(reference_ns) {
            return None;
        }
        self.last_cycle_ns = Some(reference_ns);

        // Stage C: adaptive priorities over the kinds present this cycle.
        let mut health_map = BTreeMap::new();
        for sample in &cycle {
            if SensorKind::PRIORITIZED.contains(&sample.kind) {
                health_map.insert(sample.kind, self.health.health_of(sample.kind));
            }
        }
        if health_map.is_empty() {
            return None;
        }
        let priorities = self.prioritizer.priorities(env, &health_map, now_ns);

        // Stage D: cross-validation over environmentally compensated
        // scalar magnitudes.
        let mut magnitudes = BTreeMap::new();
        for sample in &cycle {
            if priorities.contains_key(&sample.kind) {
                let value = EnvironmentalCompensator::compensate(
                    sample.kind,
                    sample.reading.magnitude(),
                    env,
                );
                magnitudes.insert(sample.kind, value);
                self.crossval.observe(sample.kind, value);
            }
        }
        let pair_scores = self.crossval.pair_scores(&self.prioritizer, env);

        let mut instantaneous: BTreeMap<SensorKind, f32> = BTreeMap::new();
        for sample in &cycle {
            let Some(&health) = health_map.get(&sample.kind) else {
                continue;
            };
            let env_score = self.prioritizer.environmental_score(sample.kind, env);
            let current =
                (env_score * health * f64::from(sample.intrinsic_confidence)) as f32;
            instantaneous.insert(sample.kind, current);
        }
        let validated = self.crossval.apply_penalties(instantaneous, &pair_scores);

        // Stage E: feature fusion and signature matching. Spectral
        // readings are normalized before they contribute; smoothing
        // already happened where the raw stream is noisy enough to need
        // it.
        let cycle: Vec<RegisteredSample> = cycle
            .into_iter()
            .map(|mut s| {
                if let SensorReading::Spectral { bands } = &mut s.reading {
                    SpectralProcessor::normalize(bands);
                }
                s
            })
            .collect();
        let features = FeatureVector::fuse(&cycle, &priorities);
        let classification = self
            .library
            .best_match(&features)
            .map_or(TargetClass::Unknown, |(sig, _)| sig.class);

        // Stage F: state estimation and confidence.
        let measured_orientation = self.dominant_orientation(&cycle, &priorities);
        let measured_position = if features.geometric_support > 0.0 {
            features.geometric / features.geometric_support
        } else {
            cycle[0].pose.position
        };
        self.estimator
            .step(reference_ns, measured_position, measured_orientation);

        let current_f64: BTreeMap<SensorKind, f64> = validated
            .iter()
            .map(|(&k, &v)| (k, f64::from(v)))
            .collect();
        let (per_sensor_confidence, fusion_confidence) =
            self.scorer.score_cycle(&current_f64, &magnitudes);

        let state = FusedState {
            timestamp_ns: reference_ns,
            position: self.estimator.position(),
            orientation: self.estimator.orientation(),
            velocity: self.estimator.velocity(),
            classification,
            per_sensor_confidence,
            fusion_confidence,
            uncertainty_covariance: self.estimator.covariance(),
        };

        self.maybe_emit(&state);
        Some(state)
    }

    /// Orientation of the highest-priority contributing sample.
    fn dominant_orientation(
        &self,
        cycle: &[RegisteredSample],
        priorities: &BTreeMap<SensorKind, f64>,
    ) -> UnitQuaternion<f64> {
        cycle
            .iter()
            .filter(|s| priorities.contains_key(&s.kind))
            .max_by(|a, b| {
                let wa = priorities.get(&a.kind).copied().unwrap_or(0.0);
                let wb = priorities.get(&b.kind).copied().unwrap_or(0.0);
                wa.partial_cmp(&wb).expect("weights are finite")
            })
            .map(|s| s.pose.orientation)
            .unwrap_or_else(UnitQuaternion::identity)
    }

    /// Publish the estimate when it is confident and strictly newer
    /// than the previous emission.
    fn maybe_emit(&mut self, state: &FusedState) {
        if state.fusion_confidence < MIN_EMIT_CONFIDENCE {
            debug!(
                confidence = state.fusion_confidence,
                "fused state withheld: confidence below floor"
            );
            return;
        }
        if self
            .last_emitted_ns
            .is_some_and(|prev| state.timestamp_ns < prev)
        {
            return;
        }
        self.last_emitted_ns = Some(state.timestamp_ns);

        self.sink.emit(Event::new(
            "fusion-pipeline",
            state.timestamp_ns,
            Priority::Normal,
            EventPayload::FusedStateUpdated(Box::new(state.clone())),
        ));
        self.sink.emit(Event::new(
            "fusion-pipeline",
            state.timestamp_ns,
            Priority::Normal,
            EventPayload::NavigationPositionUpdated {
                position: [state.position.x, state.position.y, state.position.z],
                velocity: [state.velocity.x, state.velocity.y, state.velocity.z],
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Pose, SensorReading};
    use nalgebra::Vector3;
    use sentinel_core::EventKind;
    use std::sync::Mutex;

    const MS: u64 = 1_000_000;

    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }
        fn count(&self, kind: EventKind) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.kind == kind)
                .count()
        }
        fn fused_states(&self) -> Vec<FusedState> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match &e.payload {
                    EventPayload::FusedStateUpdated(state) => Some((**state).clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventSink for Recorder {
        fn emit(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn lidar(ts: Nanos, range: f64) -> SensorSample {
        SensorSample::new(
            "lidar0",
            ts,
            SensorReading::Lidar {
                range_m: range,
                centroid: Vector3::new(range, 0.0, 0.0),
                reflectivity: 0.5,
            },
            Pose::default(),
            0.95,
        )
    }

    fn magnetic(ts: Nanos, field: f64) -> SensorSample {
        SensorSample::new(
            "mag0",
            ts,
            SensorReading::Magnetic {
                field_t: Vector3::new(field, 0.0, 0.0),
                gradient_t_m: 0.05,
            },
            Pose::default(),
            0.95,
        )
    }

    fn pipeline(recorder: &Arc<Recorder>) -> FusionPipeline {
        FusionPipeline::new(SignatureLibrary::default(), recorder.clone())
    }

    #[test]
    fn test_cycle_produces_state() {
        let recorder = Recorder::new();
        let mut fusion = pipeline(&recorder);
        let env = EnvironmentContext::default();

        let mut state = None;
        for i in 0..12u64 {
            let ts = i * 40 * MS;
            fusion.ingest(lidar(ts, 100.0 + i as f64));
            fusion.ingest(magnetic(ts, 3e-5 + i as f64 * 1e-7));
            state = fusion.run_cycle(&env, ts);
        }
        let state = state.expect("cycle with samples yields a state");
        assert!(state.fusion_confidence > 0.5);
        assert!(recorder.count(EventKind::FusedStateUpdated) > 0);
        assert!(recorder.count(EventKind::SensorDataUpdated) > 0);
    }

    #[test]
    fn test_emitted_timestamps_monotonic() {
        let recorder = Recorder::new();
        let mut fusion = pipeline(&recorder);
        let env = EnvironmentContext::default();

        for i in 0..20u64 {
            let ts = i * 40 * MS;
            fusion.ingest(lidar(ts, 100.0 + i as f64));
            fusion.ingest(magnetic(ts, 3e-5 + i as f64 * 1e-7));
            fusion.run_cycle(&env, ts);
        }

        let stamps: Vec<u64> = recorder
            .fused_states()
            .iter()
            .map(|s| s.timestamp_ns)
            .collect();
        assert!(!stamps.is_empty());
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_anticorrelated_sensors_suppress_emission() {
        let recorder = Recorder::new();
        let mut fusion = pipeline(&recorder);
        let env = EnvironmentContext::default();

        // Build a healthy baseline first.
        for i in 0..10u64 {
            let ts = i * 40 * MS;
            fusion.ingest(lidar(ts, 100.0 + i as f64));
            fusion.ingest(magnetic(ts, 3e-5 + i as f64 * 1e-7));
            fusion.run_cycle(&env, ts);
        }
        let baseline = recorder.count(EventKind::FusedStateUpdated);
        assert!(baseline > 0);

        // Anti-correlated streams: lidar rises, magnetic falls.
        let mut suppressed_states = Vec::new();
        for i in 10..22u64 {
            let ts = i * 40 * MS;
            fusion.ingest(lidar(ts, 100.0 + (i * 5) as f64));
            fusion.ingest(magnetic(ts, 5e-5 - (i as f64 - 9.0) * 2.2e-6));
            if let Some(state) = fusion.run_cycle(&env, ts) {
                suppressed_states.push(state);
            }
        }

        let last = suppressed_states.last().expect("cycles still estimate");
        assert!(
            last.fusion_confidence < 0.5,
            "confidence = {}",
            last.fusion_confidence
        );
        // Both sensors were penalized below their baseline confidence.
        assert!(last.confidence_for(SensorKind::Lidar) < 0.7);
        assert!(last.confidence_for(SensorKind::Magnetic) < 0.7);
        // No further emissions once confidence collapsed.
        let emitted_after = recorder.count(EventKind::FusedStateUpdated);
        assert!(emitted_after < baseline + 12);
    }

    #[test]
    fn test_empty_cycle_yields_nothing() {
        let recorder = Recorder::new();
        let mut fusion = pipeline(&recorder);
        assert!(fusion
            .run_cycle(&EnvironmentContext::default(), 0)
            .is_none());
    }

    #[test]
    fn test_determinism_bitwise() {
        let run = || {
            let recorder = Recorder::new();
            let mut fusion = pipeline(&recorder);
            let env = EnvironmentContext::default();
            let mut states = Vec::new();
            for i in 0..15u64 {
                let ts = i * 40 * MS;
                fusion.ingest(lidar(ts, 100.0 + (i % 4) as f64));
                fusion.ingest(magnetic(ts, 3e-5 + (i % 3) as f64 * 1e-7));
                if let Some(state) = fusion.run_cycle(&env, ts) {
                    states.push(state);
                }
            }
            states
        };

        let a = run();
        let b = run();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.timestamp_ns, y.timestamp_ns);
            assert_eq!(x.position, y.position);
            assert_eq!(x.velocity, y.velocity);
            assert_eq!(x.fusion_confidence, y.fusion_confidence);
            assert_eq!(x.uncertainty_covariance, y.uncertainty_covariance);
        }
    }
}
