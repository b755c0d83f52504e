//! Sensor taxonomy shared across the fusion and HIL crates.

use serde::{Deserialize, Serialize};

/// The sensor families the platform fuses.
///
/// LiDAR, Magnetic, and Spectral participate in adaptive prioritization;
/// IMU, Rangefinder, and Video feed the pipeline as auxiliary streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorKind {
    Lidar,
    Magnetic,
    Spectral,
    Imu,
    Rangefinder,
    Video,
}

impl SensorKind {
    /// The three kinds that carry a base fusion weight.
    pub const PRIORITIZED: [SensorKind; 3] =
        [SensorKind::Lidar, SensorKind::Magnetic, SensorKind::Spectral];

    /// Base fusion weight before environmental and reliability scaling.
    pub fn base_weight(self) -> f64 {
        match self {
            SensorKind::Lidar | SensorKind::Magnetic => 0.35,
            SensorKind::Spectral => 0.30,
            _ => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SensorKind::Lidar => "lidar",
            SensorKind::Magnetic => "magnetic",
            SensorKind::Spectral => "spectral",
            SensorKind::Imu => "imu",
            SensorKind::Rangefinder => "rangefinder",
            SensorKind::Video => "video",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_weights_sum_to_one() {
        let total: f64 = SensorKind::PRIORITIZED.iter().map(|k| k.base_weight()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}
