//! Fusion scenarios: environmental degradation, cross-validation
//! collapse, and sensor alignment calibration.

use std::collections::BTreeMap;

use nalgebra::{Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sentinel_core::{EventKind, SensorKind};
use sentinel_fusion::{
    AdaptivePrioritizer, AlignmentCalibrator, CrossValidator, EnvironmentContext, FusionPipeline,
    Pose, SensorReading, SensorSample, SignatureLibrary, CORRELATION_THRESHOLD,
};
use sentinel_harness::EventRecorder;

const MS: u64 = 1_000_000;

fn lidar(ts: u64, range: f64) -> SensorSample {
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

fn magnetic(ts: u64, field: f64) -> SensorSample {
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

fn full_health() -> BTreeMap<SensorKind, f64> {
    SensorKind::PRIORITIZED.iter().map(|&k| (k, 1.0)).collect()
}

/// Visibility collapse demotes LiDAR below Magnetic within three
/// prioritization cycles.
#[test]
fn sensor_degradation_reorders_priorities() {
    let mut prioritizer = AdaptivePrioritizer::new();
    let mut env = EnvironmentContext::default();

    // Fifty clear-weather cycles to settle the adaptive thresholds.
    for cycle in 0..50 {
        prioritizer.priorities(&env, &full_health(), cycle);
    }
    let clear = prioritizer.priorities(&env, &full_health(), 50);
    assert!(clear[&SensorKind::Lidar] >= clear[&SensorKind::Magnetic]);

    env.atmosphere.visibility_m = 100.0;
    let mut reordered_at = None;
    for cycle in 0..3 {
        let fogged = prioritizer.priorities(&env, &full_health(), 51 + cycle);
        if fogged[&SensorKind::Lidar] < fogged[&SensorKind::Magnetic] {
            reordered_at = Some(cycle);
            break;
        }
    }
    assert!(
        reordered_at.is_some(),
        "lidar never fell below magnetic within 3 cycles"
    );
}

/// Through the full pipeline: after the visibility collapse the
/// reported LiDAR confidence decreases monotonically across the next
/// three cycles.
#[test]
fn sensor_degradation_confidence_monotonic() {
    let recorder = EventRecorder::new();
    let mut fusion = FusionPipeline::new(SignatureLibrary::default(), recorder.clone());
    let mut env = EnvironmentContext::default();

    // 50 correlated LiDAR/Magnetic cycles in clear weather.
    for i in 0..50u64 {
        let ts = i * 40 * MS;
        fusion.ingest(lidar(ts, 100.0 + i as f64 * 0.5));
        fusion.ingest(magnetic(ts, 3e-5 + i as f64 * 1e-8));
        fusion.run_cycle(&env, ts);
    }

    env.atmosphere.visibility_m = 100.0;
    let mut lidar_confidences = Vec::new();
    for i in 50..53u64 {
        let ts = i * 40 * MS;
        fusion.ingest(lidar(ts, 100.0 + i as f64 * 0.5));
        fusion.ingest(magnetic(ts, 3e-5 + i as f64 * 1e-8));
        let state = fusion.run_cycle(&env, ts).expect("cycle estimates");
        lidar_confidences.push(state.confidence_for(SensorKind::Lidar));
    }

    assert!(
        lidar_confidences.windows(2).all(|w| w[1] < w[0]),
        "confidences not monotonic: {lidar_confidences:?}"
    );
}

/// Anti-correlated Magnetic drags the pairwise correlation under the
/// threshold within ten samples and both confidences down with it.
#[test]
fn cross_validation_deficit() {
    let mut validator = CrossValidator::new();
    let prioritizer = AdaptivePrioritizer::new();
    let env = EnvironmentContext::default();

    let mut breached_at = None;
    for i in 0..10 {
        validator.observe(SensorKind::Lidar, 100.0 + i as f64);
        validator.observe(SensorKind::Magnetic, 100.0 - i as f64);
        let scores = validator.pair_scores(&prioritizer, &env);
        if let Some(&corr) = scores.get(&(SensorKind::Lidar, SensorKind::Magnetic)) {
            if corr < CORRELATION_THRESHOLD {
                breached_at = Some(i);
                break;
            }
        }
    }
    assert!(breached_at.is_some(), "correlation never breached threshold");

    let scores = validator.pair_scores(&prioritizer, &env);
    let mut confidences = BTreeMap::new();
    confidences.insert(SensorKind::Lidar, 0.9f32);
    confidences.insert(SensorKind::Magnetic, 0.9f32);
    let adjusted = validator.apply_penalties(confidences, &scores);
    assert!(adjusted[&SensorKind::Lidar] < 0.9);
    assert!(adjusted[&SensorKind::Magnetic] < 0.9);
}

/// Pipeline-level collapse: fusion confidence drops under 0.5, state
/// emission stops, and resumes once the streams agree again.
#[test]
fn cross_validation_suppresses_and_recovers() {
    let recorder = EventRecorder::new();
    let mut fusion = FusionPipeline::new(SignatureLibrary::default(), recorder.clone());
    let env = EnvironmentContext::default();

    // Healthy correlated phase.
    for i in 0..10u64 {
        let ts = i * 40 * MS;
        fusion.ingest(lidar(ts, 100.0 + i as f64));
        fusion.ingest(magnetic(ts, 3e-5 + i as f64 * 1e-7));
        fusion.run_cycle(&env, ts);
    }
    let healthy_emissions = recorder.count(EventKind::FusedStateUpdated);
    assert!(healthy_emissions > 0);

    // Anti-correlated phase.
    let mut collapsed = None;
    for i in 10..24u64 {
        let ts = i * 40 * MS;
        fusion.ingest(lidar(ts, 100.0 + (i * 4) as f64));
        fusion.ingest(magnetic(ts, 8e-5 - (i as f64 - 9.0) * 3e-6));
        if let Some(state) = fusion.run_cycle(&env, ts) {
            collapsed = Some(state);
        }
    }
    let collapsed = collapsed.expect("estimator still runs");
    assert!(
        collapsed.fusion_confidence < 0.5,
        "confidence = {}",
        collapsed.fusion_confidence
    );
    let suppressed_emissions = recorder.count(EventKind::FusedStateUpdated);

    // Re-correlated recovery phase.
    let mut recovered = false;
    for i in 24..60u64 {
        let ts = i * 40 * MS;
        fusion.ingest(lidar(ts, 150.0 + i as f64));
        fusion.ingest(magnetic(ts, 3e-5 + i as f64 * 1e-7));
        if let Some(state) = fusion.run_cycle(&env, ts) {
            if state.fusion_confidence >= 0.5 {
                recovered = true;
            }
        }
    }
    assert!(recovered, "confidence never recovered");
    assert!(recorder.count(EventKind::FusedStateUpdated) > suppressed_emissions);
}

/// A spectral stream matching a library signature classifies the
/// target through the full pipeline.
#[test]
fn signature_match_classifies_target() {
    use sentinel_core::TargetClass;

    let recorder = EventRecorder::new();
    let library = SignatureLibrary::standard();
    assert!(!library.is_empty());
    let armored: Vec<f64> = vec![
        0.9, 0.85, 0.35, 0.8, 0.88, 0.9, 0.4, 0.86, 0.84, 0.8, 0.3, 0.78, 0.82, 0.85, 0.87,
        0.9,
    ];

    let mut fusion = FusionPipeline::new(library, recorder.clone());
    let env = EnvironmentContext::default();

    let mut last = None;
    for i in 0..12u64 {
        let ts = i * 40 * MS;
        let scale = 1.0 + i as f64 * 0.01;
        fusion.ingest(lidar(ts, 100.0 + i as f64));
        fusion.ingest(SensorSample::new(
            "spec0",
            ts,
            SensorReading::Spectral {
                bands: armored.iter().map(|b| b * scale).collect(),
            },
            Pose::default(),
            0.95,
        ));
        if let Some(state) = fusion.run_cycle(&env, ts) {
            last = Some(state);
        }
    }

    let state = last.expect("pipeline produced estimates");
    assert_eq!(state.classification, TargetClass::Military);
}

/// Calibration against a known rigid transform with N(0, 0.01) noise:
/// recovered within 5 degrees / 5 cm, confidence above 0.9.
#[test]
fn alignment_calibration_recovers_ground_truth() {
    let rotation = Rotation3::from_euler_angles(0.02, 0.1, -0.25);
    let translation = Vector3::new(1.2, -0.4, 0.8);
    let mut rng = StdRng::seed_from_u64(4242);

    let mut reference = Vec::new();
    let mut sensor = Vec::new();
    for _ in 0..10 {
        let p = Vector3::new(
            rng.gen_range(-20.0..20.0),
            rng.gen_range(-20.0..20.0),
            rng.gen_range(-20.0..20.0),
        );
        // Box-Muller-free gaussian-ish noise: sum of uniforms is close
        // enough at sigma 0.01 for this tolerance.
        let noise = Vector3::new(
            (rng.gen_range(-1.0..1.0f64) + rng.gen_range(-1.0..1.0)) * 0.005,
            (rng.gen_range(-1.0..1.0f64) + rng.gen_range(-1.0..1.0)) * 0.005,
            (rng.gen_range(-1.0..1.0f64) + rng.gen_range(-1.0..1.0)) * 0.005,
        );
        reference.push(rotation * p + translation + noise);
        sensor.push(p);
    }

    let result = AlignmentCalibrator::solve(&reference, &sensor).unwrap();
    assert!(result.rotation.angle_to(&rotation) < 5.0_f64.to_radians());
    assert!((result.translation - translation).norm() < 0.05);
    assert!(result.confidence > 0.9, "confidence = {}", result.confidence);
    assert!(result.success());
}

/// The pipeline installs the calibration transform and reports the
/// alignment event.
#[test]
fn calibration_installs_transform() {
    let recorder = EventRecorder::new();
    let mut fusion = FusionPipeline::new(SignatureLibrary::default(), recorder.clone());

    let rotation = Rotation3::identity();
    let translation = Vector3::new(0.5, 0.0, 0.0);
    let sensor: Vec<Vector3<f64>> = (0..12)
        .map(|i| Vector3::new(i as f64, (i % 3) as f64, 1.0))
        .collect();
    let reference: Vec<Vector3<f64>> = sensor.iter().map(|p| rotation * p + translation).collect();

    let result = fusion
        .calibrate(
            SensorKind::Lidar,
            "lidar0",
            "imu0",
            &reference,
            &sensor,
            1_000,
        )
        .unwrap();
    assert!(result.success());
    assert_eq!(recorder.count(EventKind::SensorAlignmentComplete), 1);
}
