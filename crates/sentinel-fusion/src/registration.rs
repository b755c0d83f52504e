//! Temporal and spatial registration
//!
//! Stage A aligns heterogeneous streams onto one reference timestamp,
//! interpolating across gaps up to 50 ms and dropping anything wider.
//! Stage B moves every sample into the platform reference frame through
//! the calibrator's rigid-body transforms.

use std::collections::BTreeMap;

use nalgebra::{Isometry3, Vector3};

use sentinel_core::clock::Nanos;
use sentinel_core::SensorKind;

use crate::sample::{Pose, SensorReading, SensorSample};

/// Maximum timestamp gap bridged by interpolation.
pub const TEMPORAL_GATE: std::time::Duration = std::time::Duration::from_millis(50);

/// Per-sensor buffer depth; older samples age out.
const BUFFER_DEPTH: usize = 32;

/// A sample carried to the shared reference timestamp.
#[derive(Debug, Clone)]
pub struct RegisteredSample {
    pub kind: SensorKind,
    pub sensor_id: String,
    pub reference_ns: Nanos,
    pub reading: SensorReading,
    pub pose: Pose,
    pub intrinsic_confidence: f32,
}

/// Stage A: nearest-in-time alignment with bounded interpolation.
#[derive(Default)]
pub struct TemporalRegistrar {
    buffers: BTreeMap<SensorKind, Vec<SensorSample>>,
}

impl TemporalRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, sample: SensorSample) {
        let buffer = self.buffers.entry(sample.kind).or_default();
        buffer.push(sample);
        if buffer.len() > BUFFER_DEPTH {
            buffer.remove(0);
        }
    }

    pub fn active_kinds(&self) -> Vec<SensorKind> {
        self.buffers
            .iter()
            .filter(|(_, buf)| !buf.is_empty())
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Align every active sensor to the newest timestamp seen across
    /// sensors. Sensors whose nearest sample is farther than the gate
    /// sit this cycle out.
    pub fn register_cycle(&mut self) -> Vec<RegisteredSample> {
        let reference_ns = self
            .buffers
            .values()
            .filter_map(|buf| buf.last().map(|s| s.timestamp_ns))
            .max();
        let Some(reference_ns) = reference_ns else {
            return Vec::new();
        };

        let gate = TEMPORAL_GATE.as_nanos() as u64;
        let mut out = Vec::new();
        for buffer in self.buffers.values() {
            if let Some(aligned) = align_to(buffer, reference_ns, gate) {
                out.push(aligned);
            }
        }
        out
    }
}

/// Nearest sample to the reference, linearly interpolated against its
/// neighbor when both straddle the reference inside the gate.
fn align_to(buffer: &[SensorSample], reference_ns: Nanos, gate: u64) -> Option<RegisteredSample> {
    let nearest_idx = buffer
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| s.timestamp_ns.abs_diff(reference_ns))
        .map(|(i, _)| i)?;
    let nearest = &buffer[nearest_idx];
    if nearest.timestamp_ns.abs_diff(reference_ns) > gate {
        return None;
    }

    // Straddling neighbor on the other side of the reference.
    let neighbor = if nearest.timestamp_ns < reference_ns {
        buffer.get(nearest_idx + 1)
    } else {
        nearest_idx.checked_sub(1).and_then(|i| buffer.get(i))
    };

    let reading = match neighbor {
        Some(other) if other.timestamp_ns.abs_diff(reference_ns) <= gate => {
            let (a, b) = if nearest.timestamp_ns <= other.timestamp_ns {
                (nearest, other)
            } else {
                (other, nearest)
            };
            let span = b.timestamp_ns.saturating_sub(a.timestamp_ns);
            if span == 0 {
                nearest.reading.clone()
            } else {
                let t = (reference_ns.saturating_sub(a.timestamp_ns)) as f64 / span as f64;
                lerp_reading(&a.reading, &b.reading, t.clamp(0.0, 1.0))
            }
        }
        _ => nearest.reading.clone(),
    };

    Some(RegisteredSample {
        kind: nearest.kind,
        sensor_id: nearest.sensor_id.clone(),
        reference_ns,
        reading,
        pose: nearest.pose.clone(),
        intrinsic_confidence: nearest.intrinsic_confidence,
    })
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_vec(a: &Vector3<f64>, b: &Vector3<f64>, t: f64) -> Vector3<f64> {
    a + (b - a) * t
}

fn lerp_reading(a: &SensorReading, b: &SensorReading, t: f64) -> SensorReading {
    match (a, b) {
        (
            SensorReading::Lidar {
                range_m: r1,
                centroid: c1,
                reflectivity: f1,
            },
            SensorReading::Lidar {
                range_m: r2,
                centroid: c2,
                reflectivity: f2,
            },
        ) => SensorReading::Lidar {
            range_m: lerp(*r1, *r2, t),
            centroid: lerp_vec(c1, c2, t),
            reflectivity: lerp(*f1, *f2, t),
        },
        (
            SensorReading::Magnetic {
                field_t: f1,
                gradient_t_m: g1,
            },
            SensorReading::Magnetic {
                field_t: f2,
                gradient_t_m: g2,
            },
        ) => SensorReading::Magnetic {
            field_t: lerp_vec(f1, f2, t),
            gradient_t_m: lerp(*g1, *g2, t),
        },
        (SensorReading::Spectral { bands: b1 }, SensorReading::Spectral { bands: b2 })
            if b1.len() == b2.len() =>
        {
            SensorReading::Spectral {
                bands: b1
                    .iter()
                    .zip(b2.iter())
                    .map(|(x, y)| lerp(*x, *y, t))
                    .collect(),
            }
        }
        (
            SensorReading::Rangefinder { range_m: r1 },
            SensorReading::Rangefinder { range_m: r2 },
        ) => SensorReading::Rangefinder {
            range_m: lerp(*r1, *r2, t),
        },
        // Heterogeneous or non-interpolable pairs: keep the nearer one.
        _ => {
            if t < 0.5 {
                a.clone()
            } else {
                b.clone()
            }
        }
    }
}

/// Stage B: rigid-body transforms into the platform frame.
#[derive(Default)]
pub struct SpatialRegistrar {
    transforms: BTreeMap<SensorKind, Isometry3<f64>>,
}

impl SpatialRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the calibration transform for one sensor kind.
    pub fn set_transform(&mut self, kind: SensorKind, transform: Isometry3<f64>) {
        self.transforms.insert(kind, transform);
    }

    pub fn transform_for(&self, kind: SensorKind) -> Isometry3<f64> {
        self.transforms
            .get(&kind)
            .copied()
            .unwrap_or_else(Isometry3::identity)
    }

    /// Apply the sensor-to-platform transform to pose and any spatial
    /// reading content.
    pub fn register(&self, mut sample: RegisteredSample) -> RegisteredSample {
        let iso = self.transform_for(sample.kind);

        sample.pose.position = iso.transform_point(&sample.pose.position.into()).coords;
        sample.pose.orientation = iso.rotation * sample.pose.orientation;

        if let SensorReading::Lidar { centroid, .. } = &mut sample.reading {
            *centroid = iso.transform_point(&(*centroid).into()).coords;
        }
        if let SensorReading::Magnetic { field_t, .. } = &mut sample.reading {
            *field_t = iso.rotation * *field_t;
        }
        sample
    }
}
