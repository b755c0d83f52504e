//! Per-sensor health tracking
//!
//! Health in [0, 1], nudged down on stream faults and recovered slowly
//! on clean samples. Feeds the prioritizer's reliability term.

use std::collections::BTreeMap;

use sentinel_core::SensorKind;

const RECOVERY_STEP: f64 = 0.05;
const FAULT_STEP: f64 = 0.25;

#[derive(Default)]
pub struct SensorHealthTracker {
    health: BTreeMap<SensorKind, f64>,
}

impl SensorHealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clean sample arrived; health creeps back toward 1.
    pub fn observe_ok(&mut self, kind: SensorKind) {
        let h = self.health.entry(kind).or_insert(1.0);
        *h = (*h + RECOVERY_STEP).min(1.0);
    }

    /// A fault was attributed to this sensor.
    pub fn observe_fault(&mut self, kind: SensorKind) {
        let h = self.health.entry(kind).or_insert(1.0);
        *h = (*h - FAULT_STEP).max(0.0);
    }

    pub fn set_health(&mut self, kind: SensorKind, health: f64) {
        self.health.insert(kind, health.clamp(0.0, 1.0));
    }

    pub fn health_of(&self, kind: SensorKind) -> f64 {
        self.health.get(&kind).copied().unwrap_or(1.0)
    }

    /// Health map restricted to kinds that have reported at all.
    pub fn known(&self) -> BTreeMap<SensorKind, f64> {
        self.health.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_degrade_and_recover() {
        let mut tracker = SensorHealthTracker::new();
        tracker.observe_ok(SensorKind::Lidar);
        assert_eq!(tracker.health_of(SensorKind::Lidar), 1.0);

        tracker.observe_fault(SensorKind::Lidar);
        tracker.observe_fault(SensorKind::Lidar);
        assert!((tracker.health_of(SensorKind::Lidar) - 0.5).abs() < 1e-12);

        for _ in 0..20 {
            tracker.observe_ok(SensorKind::Lidar);
        }
        assert_eq!(tracker.health_of(SensorKind::Lidar), 1.0);
    }

    #[test]
    fn test_health_floor() {
        let mut tracker = SensorHealthTracker::new();
        for _ in 0..10 {
            tracker.observe_fault(SensorKind::Spectral);
        }
        assert_eq!(tracker.health_of(SensorKind::Spectral), 0.0);
    }
}
