//! Sensor samples entering the pipeline

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use sentinel_core::clock::Nanos;
use sentinel_core::SensorKind;

/// Sensor pose at sampling time, in the sensor's own frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

/// Tagged reading per sensor family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorReading {
    Lidar {
        /// Range to the dominant return, meters.
        range_m: f64,
        /// Centroid of the return cluster, sensor frame.
        centroid: Vector3<f64>,
        /// Mean return reflectivity in [0, 1].
        reflectivity: f64,
    },
    Magnetic {
        /// Field vector, tesla.
        field_t: Vector3<f64>,
        /// Field gradient magnitude, tesla/m.
        gradient_t_m: f64,
    },
    Spectral {
        /// Band radiances, fixed grid per sensor configuration.
        bands: Vec<f64>,
    },
    Imu {
        angular_rate_rad_s: Vector3<f64>,
        acceleration_m_s2: Vector3<f64>,
    },
    Rangefinder {
        range_m: f64,
    },
    Video {
        mean_luminance: f64,
        contrast: f64,
    },
}

impl SensorReading {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorReading::Lidar { .. } => SensorKind::Lidar,
            SensorReading::Magnetic { .. } => SensorKind::Magnetic,
            SensorReading::Spectral { .. } => SensorKind::Spectral,
            SensorReading::Imu { .. } => SensorKind::Imu,
            SensorReading::Rangefinder { .. } => SensorKind::Rangefinder,
            SensorReading::Video { .. } => SensorKind::Video,
        }
    }

    /// Scalar projection used by the cross-validation correlator.
    pub fn magnitude(&self) -> f64 {
        match self {
            SensorReading::Lidar { range_m, .. } | SensorReading::Rangefinder { range_m } => {
                *range_m
            }
            SensorReading::Magnetic { field_t, .. } => field_t.norm(),
            SensorReading::Spectral { bands } => {
                if bands.is_empty() {
                    0.0
                } else {
                    bands.iter().sum::<f64>() / bands.len() as f64
                }
            }
            SensorReading::Imu {
                acceleration_m_s2, ..
            } => acceleration_m_s2.norm(),
            SensorReading::Video { mean_luminance, .. } => *mean_luminance,
        }
    }
}

/// One timestamped sample from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub sensor_id: String,
    pub kind: SensorKind,
    pub timestamp_ns: Nanos,
    pub reading: SensorReading,
    pub pose: Pose,
    /// The sensor's own confidence in this sample, [0, 1].
    pub intrinsic_confidence: f32,
}

impl SensorSample {
    pub fn new(
        sensor_id: impl Into<String>,
        timestamp_ns: Nanos,
        reading: SensorReading,
        pose: Pose,
        intrinsic_confidence: f32,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            kind: reading.kind(),
            timestamp_ns,
            reading,
            pose,
            intrinsic_confidence,
        }
    }
}
