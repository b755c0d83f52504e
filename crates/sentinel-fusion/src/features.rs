//! Feature extraction, priority-weighted fusion, and signature matching

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use sentinel_core::{SensorKind, TargetClass};

use crate::registration::RegisteredSample;
use crate::sample::SensorReading;

/// Combined match score at or above which a signature is accepted.
pub const MATCH_ACCEPT_SCORE: f64 = 0.85;

/// Metric weights: spectral angle, feature correlation, absorption
/// match.
const METRIC_WEIGHTS: [f64; 3] = [0.4, 0.3, 0.3];

/// Fused per-cycle feature set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    /// Weighted target centroid in the platform frame.
    pub geometric: Vector3<f64>,
    /// Weighted range to target, meters.
    pub range_m: f64,
    /// Weighted EM emission intensity, normalized.
    pub em_intensity: f64,
    /// Weighted spectral band vector.
    pub spectrum: Vec<f64>,
    /// Long-wave thermal proxy derived from the spectrum tail.
    pub thermal: f64,
    /// Sum of priority weights that actually contributed.
    pub support: f64,
    /// Portion of `support` that carried geometric content.
    pub geometric_support: f64,
}

impl FeatureVector {
    /// Priority-weighted summation across this cycle's registered
    /// samples. Weights absent from the priority map contribute zero.
    pub fn fuse(
        samples: &[RegisteredSample],
        priorities: &std::collections::BTreeMap<SensorKind, f64>,
    ) -> Self {
        let mut out = Self::default();
        for sample in samples {
            let weight = priorities.get(&sample.kind).copied().unwrap_or(0.0);
            if weight <= 0.0 {
                continue;
            }
            match &sample.reading {
                SensorReading::Lidar {
                    range_m, centroid, ..
                } => {
                    out.geometric += centroid * weight;
                    out.range_m += range_m * weight;
                    out.support += weight;
                    out.geometric_support += weight;
                }
                SensorReading::Magnetic { field_t, .. } => {
                    // Normalize against a 100 µT full scale.
                    out.em_intensity += (field_t.norm() / 1e-4).min(1.0) * weight;
                    out.support += weight;
                }
                SensorReading::Spectral { bands } => {
                    if out.spectrum.len() < bands.len() {
                        out.spectrum.resize(bands.len(), 0.0);
                    }
                    for (acc, band) in out.spectrum.iter_mut().zip(bands.iter()) {
                        *acc += band * weight;
                    }
                    out.thermal += thermal_proxy(bands) * weight;
                    out.support += weight;
                }
                _ => {}
            }
        }
        out
    }
}

/// Mean of the upper half of the band grid, where the long-wave
/// content sits.
fn thermal_proxy(bands: &[f64]) -> f64 {
    if bands.is_empty() {
        return 0.0;
    }
    let tail = &bands[bands.len() / 2..];
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// One library entry the matcher scores against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub class: TargetClass,
    pub spectrum: Vec<f64>,
    /// Expected normalized EM intensity.
    pub em_intensity: f64,
    /// Band indices where the material absorbs (local minima).
    pub absorption_bands: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SignatureLibrary {
    signatures: Vec<Signature>,
}

impl SignatureLibrary {
    pub fn new(signatures: Vec<Signature>) -> Self {
        Self { signatures }
    }

    /// Stock library of the platform's baseline target signatures over
    /// the standard 16-band grid.
    pub fn standard() -> Self {
        Self::new(vec![
            Signature {
                name: "armored-vehicle".into(),
                class: TargetClass::Military,
                spectrum: vec![
                    0.9, 0.85, 0.35, 0.8, 0.88, 0.9, 0.4, 0.86, 0.84, 0.8, 0.3, 0.78, 0.82,
                    0.85, 0.87, 0.9,
                ],
                em_intensity: 0.7,
                absorption_bands: vec![2, 6, 10],
            },
            Signature {
                name: "radar-emitter".into(),
                class: TargetClass::Military,
                spectrum: vec![
                    0.6, 0.62, 0.64, 0.2, 0.66, 0.68, 0.7, 0.25, 0.72, 0.7, 0.68, 0.66, 0.3,
                    0.64, 0.62, 0.6,
                ],
                em_intensity: 0.95,
                absorption_bands: vec![3, 7, 12],
            },
            Signature {
                name: "civilian-truck".into(),
                class: TargetClass::Civilian,
                spectrum: vec![
                    0.7, 0.72, 0.74, 0.76, 0.3, 0.78, 0.8, 0.82, 0.84, 0.35, 0.86, 0.88, 0.9,
                    0.92, 0.94, 0.96,
                ],
                em_intensity: 0.2,
                absorption_bands: vec![4, 9],
            },
        ])
    }

    pub fn push(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Best-scoring signature at or above the acceptance score.
    pub fn best_match(&self, features: &FeatureVector) -> Option<(&Signature, f64)> {
        self.signatures
            .iter()
            .map(|sig| (sig, match_score(sig, features)))
            .filter(|(_, score)| *score >= MATCH_ACCEPT_SCORE)
            .max_by(|a, b| a.1.partial_cmp(&b.1).expect("scores are finite"))
    }
}

/// Weighted combination of the three similarity metrics.
pub fn match_score(signature: &Signature, features: &FeatureVector) -> f64 {
    let angle = spectral_angle_score(&signature.spectrum, &features.spectrum);
    let correlation = correlation_score(&signature.spectrum, &features.spectrum);
    let absorption = absorption_score(&signature.absorption_bands, &features.spectrum);
    METRIC_WEIGHTS[0] * angle + METRIC_WEIGHTS[1] * correlation + METRIC_WEIGHTS[2] * absorption
}

/// Spectral angle mapper: 1 at zero angle, 0 at orthogonal.
fn spectral_angle_score(reference: &[f64], observed: &[f64]) -> f64 {
    let n = reference.len().min(observed.len());
    if n == 0 {
        return 0.0;
    }
    let dot: f64 = reference[..n]
        .iter()
        .zip(&observed[..n])
        .map(|(a, b)| a * b)
        .sum();
    let norm_r: f64 = reference[..n].iter().map(|a| a * a).sum::<f64>().sqrt();
    let norm_o: f64 = observed[..n].iter().map(|b| b * b).sum::<f64>().sqrt();
    if norm_r == 0.0 || norm_o == 0.0 {
        return 0.0;
    }
    let cos = (dot / (norm_r * norm_o)).clamp(-1.0, 1.0);
    1.0 - cos.acos() / std::f64::consts::FRAC_PI_2
}

/// Pearson correlation mapped into [0, 1].
fn correlation_score(reference: &[f64], observed: &[f64]) -> f64 {
    let n = reference.len().min(observed.len());
    if n < 2 {
        return 0.0;
    }
    let xs = &reference[..n];
    let ys = &observed[..n];
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let cov: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let var_x: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let var_y: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    ((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0) + 1.0) / 2.0
}

/// Fraction of expected absorption bands that appear as local minima in
/// the observed spectrum.
fn absorption_score(expected_bands: &[usize], observed: &[f64]) -> f64 {
    if expected_bands.is_empty() {
        return 1.0;
    }
    if observed.len() < 3 {
        return 0.0;
    }
    let hits = expected_bands
        .iter()
        .filter(|&&idx| {
            idx > 0
                && idx + 1 < observed.len()
                && observed[idx] < observed[idx - 1]
                && observed[idx] < observed[idx + 1]
        })
        .count();
    hits as f64 / expected_bands.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Pose;
    use std::collections::BTreeMap;

    fn spectrum_with_dips() -> Vec<f64> {
        // Local minima at indices 2 and 6.
        vec![1.0, 0.9, 0.4, 0.8, 0.9, 1.0, 0.3, 0.9]
    }

    fn library() -> SignatureLibrary {
        SignatureLibrary::new(vec![Signature {
            name: "armored-vehicle".into(),
            class: TargetClass::Military,
            spectrum: spectrum_with_dips(),
            em_intensity: 0.6,
            absorption_bands: vec![2, 6],
        }])
    }

    fn observed(spectrum: Vec<f64>) -> FeatureVector {
        FeatureVector {
            spectrum,
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_spectrum_matches() {
        let lib = library();
        let (sig, score) = lib.best_match(&observed(spectrum_with_dips())).unwrap();
        assert_eq!(sig.class, TargetClass::Military);
        assert!(score > 0.99, "score = {score}");
    }

    #[test]
    fn test_flat_spectrum_rejected() {
        let lib = library();
        assert!(lib.best_match(&observed(vec![0.5; 8])).is_none());
    }

    #[test]
    fn test_metric_weights_are_normalized() {
        assert!((METRIC_WEIGHTS.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fusion_weights_by_priority() {
        let mut priorities = BTreeMap::new();
        priorities.insert(SensorKind::Lidar, 0.6);
        priorities.insert(SensorKind::Magnetic, 0.4);

        let samples = vec![
            RegisteredSample {
                kind: SensorKind::Lidar,
                sensor_id: "lidar0".into(),
                reference_ns: 0,
                reading: SensorReading::Lidar {
                    range_m: 100.0,
                    centroid: Vector3::new(100.0, 0.0, 0.0),
                    reflectivity: 0.5,
                },
                pose: Pose::default(),
                intrinsic_confidence: 0.9,
            },
            RegisteredSample {
                kind: SensorKind::Magnetic,
                sensor_id: "mag0".into(),
                reference_ns: 0,
                reading: SensorReading::Magnetic {
                    field_t: Vector3::new(5e-5, 0.0, 0.0),
                    gradient_t_m: 0.0,
                },
                pose: Pose::default(),
                intrinsic_confidence: 0.9,
            },
        ];

        let fused = FeatureVector::fuse(&samples, &priorities);
        assert!((fused.range_m - 60.0).abs() < 1e-9);
        assert!((fused.em_intensity - 0.2).abs() < 1e-9);
        assert!((fused.support - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unprioritized_sample_ignored() {
        let priorities = BTreeMap::new();
        let samples = vec![RegisteredSample {
            kind: SensorKind::Lidar,
            sensor_id: "lidar0".into(),
            reference_ns: 0,
            reading: SensorReading::Lidar {
                range_m: 100.0,
                centroid: Vector3::zeros(),
                reflectivity: 0.5,
            },
            pose: Pose::default(),
            intrinsic_confidence: 0.9,
        }];
        let fused = FeatureVector::fuse(&samples, &priorities);
        assert_eq!(fused.support, 0.0);
    }
}
