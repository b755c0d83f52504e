//! Adaptive sensor prioritization
//!
//! Per cycle, each prioritized sensor kind gets
//! `priority = base_weight × env_score × reliability`, normalized so the
//! active set sums to one. Environmental impact factors are normalized
//! against thresholds that track observed conditions at ±5 % per cycle,
//! clamped to plausible bounds.

use std::collections::BTreeMap;

use sentinel_core::clock::Nanos;
use sentinel_core::SensorKind;

use crate::environment::{EnvironmentContext, TerrainHint};

const THRESHOLD_ADAPTATION_RATE: f64 = 0.05;

/// Impact factors are clamped into this band so one brutal condition
/// never zeroes a sensor outright.
const IMPACT_FLOOR: f64 = 0.1;
const IMPACT_CEIL: f64 = 1.0;

#[derive(Debug, Clone)]
struct ConditionThresholds {
    visibility_m: f64,
    precipitation_mm_hr: f64,
    temperature_k: f64,
    em_noise: f64,
}

impl Default for ConditionThresholds {
    fn default() -> Self {
        Self {
            visibility_m: 1_000.0,
            precipitation_mm_hr: 25.0,
            temperature_k: 273.15,
            em_noise: 0.1,
        }
    }
}

/// A scheduled penalty from the sensor recovery policy: the kind's
/// priority weight is multiplied until the deadline, after which the
/// sensor is due for recalibration.
#[derive(Debug, Clone, Copy)]
struct Penalty {
    factor: f64,
    until_ns: Nanos,
}

pub struct AdaptivePrioritizer {
    thresholds: ConditionThresholds,
    penalties: BTreeMap<SensorKind, Penalty>,
    recalibration_due: Vec<SensorKind>,
}

impl AdaptivePrioritizer {
    pub fn new() -> Self {
        Self {
            thresholds: ConditionThresholds::default(),
            penalties: BTreeMap::new(),
            recalibration_due: Vec::new(),
        }
    }

    /// Apply the sensor-degradation recovery directive: multiply the
    /// kind's weight by `factor` until `until_ns`.
    pub fn penalize(&mut self, kind: SensorKind, factor: f64, until_ns: Nanos) {
        self.penalties.insert(
            kind,
            Penalty {
                factor: factor.clamp(0.0, 1.0),
                until_ns,
            },
        );
    }

    /// Kinds whose penalty elapsed since the last call; each is due a
    /// recalibration pass.
    pub fn take_recalibration_due(&mut self) -> Vec<SensorKind> {
        std::mem::take(&mut self.recalibration_due)
    }

    /// Compute normalized priorities for the prioritized kinds.
    ///
    /// `sensor_health` is each kind's health in [0, 1]; kinds absent
    /// from the map are treated as offline and excluded.
    pub fn priorities(
        &mut self,
        environment: &EnvironmentContext,
        sensor_health: &BTreeMap<SensorKind, f64>,
        now_ns: Nanos,
    ) -> BTreeMap<SensorKind, f64> {
        self.adjust_thresholds(environment);
        self.expire_penalties(now_ns);

        let mut priorities = BTreeMap::new();
        for kind in SensorKind::PRIORITIZED {
            let Some(&health) = sensor_health.get(&kind) else {
                continue;
            };
            let env_score = self.environmental_score(kind, environment);
            let reliability = health * (1.0 - self.environmental_degradation(kind, environment));
            let penalty = self.penalties.get(&kind).map_or(1.0, |p| p.factor);
            priorities.insert(
                kind,
                kind.base_weight() * env_score * reliability * penalty,
            );
        }

        let total: f64 = priorities.values().sum();
        if total > 0.0 {
            for value in priorities.values_mut() {
                *value /= total;
            }
        }
        priorities
    }

    /// Mean of the kind's environmental impact factors.
    pub fn environmental_score(&self, kind: SensorKind, env: &EnvironmentContext) -> f64 {
        let impacts = self.impact_factors(kind, env);
        if impacts.is_empty() {
            return IMPACT_CEIL;
        }
        impacts.iter().sum::<f64>() / impacts.len() as f64
    }

    fn impact_factors(&self, kind: SensorKind, env: &EnvironmentContext) -> Vec<f64> {
        match kind {
            SensorKind::Lidar => vec![
                self.visibility_impact(env.atmosphere.visibility_m),
                self.precipitation_impact(env.weather.precipitation_mm_hr),
                self.atmospheric_impact(env),
                terrain_impact(kind, env.terrain_hint),
            ],
            SensorKind::Magnetic => vec![
                self.em_noise_impact(env.mean_em_noise()),
                self.temperature_impact(env.atmosphere.temperature_k),
                terrain_impact(kind, env.terrain_hint),
            ],
            SensorKind::Spectral => vec![
                self.atmospheric_impact(env),
                self.visibility_impact(env.atmosphere.visibility_m),
                terrain_impact(kind, env.terrain_hint),
            ],
            _ => Vec::new(),
        }
    }

    fn environmental_degradation(&self, kind: SensorKind, env: &EnvironmentContext) -> f64 {
        match kind {
            SensorKind::Lidar => {
                0.2 * (1.0 - self.visibility_impact(env.atmosphere.visibility_m))
            }
            SensorKind::Magnetic => 0.3 * self.em_noise_level(env.mean_em_noise()),
            SensorKind::Spectral => 0.25 * (1.0 - self.atmospheric_impact(env)),
            _ => 0.0,
        }
    }

    fn visibility_impact(&self, visibility_m: f64) -> f64 {
        (visibility_m / self.thresholds.visibility_m).clamp(IMPACT_FLOOR, IMPACT_CEIL)
    }

    fn precipitation_impact(&self, precipitation: f64) -> f64 {
        (1.0 - precipitation / self.thresholds.precipitation_mm_hr)
            .clamp(IMPACT_FLOOR, IMPACT_CEIL)
    }

    fn temperature_impact(&self, temperature_k: f64) -> f64 {
        (temperature_k / self.thresholds.temperature_k).clamp(IMPACT_FLOOR, IMPACT_CEIL)
    }

    fn atmospheric_impact(&self, env: &EnvironmentContext) -> f64 {
        let temp = env.atmosphere.temperature_k / self.thresholds.temperature_k;
        let pressure = env.atmosphere.pressure_pa / 101_325.0;
        let humidity = 1.0 - env.atmosphere.humidity_pct / 100.0;
        ((temp + pressure + humidity) / 3.0).clamp(IMPACT_FLOOR, IMPACT_CEIL)
    }

    fn em_noise_impact(&self, noise: f64) -> f64 {
        (1.0 - noise / self.thresholds.em_noise).clamp(IMPACT_FLOOR, IMPACT_CEIL)
    }

    /// Raw noise level relative to threshold, for degradation.
    fn em_noise_level(&self, noise: f64) -> f64 {
        (noise / self.thresholds.em_noise).clamp(0.0, 1.0)
    }

    /// Thresholds drift toward observed conditions at ±5 % per cycle.
    fn adjust_thresholds(&mut self, env: &EnvironmentContext) {
        let t = &mut self.thresholds;
        if env.atmosphere.visibility_m < t.visibility_m {
            t.visibility_m *= 1.0 - THRESHOLD_ADAPTATION_RATE;
        } else {
            t.visibility_m *= 1.0 + THRESHOLD_ADAPTATION_RATE;
        }
        if env.weather.precipitation_mm_hr > t.precipitation_mm_hr {
            t.precipitation_mm_hr *= 1.0 + THRESHOLD_ADAPTATION_RATE;
        } else {
            t.precipitation_mm_hr *= 1.0 - THRESHOLD_ADAPTATION_RATE;
        }
        if env.mean_em_noise() > t.em_noise {
            t.em_noise *= 1.0 + THRESHOLD_ADAPTATION_RATE;
        } else {
            t.em_noise *= 1.0 - THRESHOLD_ADAPTATION_RATE;
        }

        // Plausible bounds.
        t.visibility_m = t.visibility_m.clamp(100.0, 20_000.0);
        t.precipitation_mm_hr = t.precipitation_mm_hr.clamp(1.0, 150.0);
        t.em_noise = t.em_noise.clamp(0.01, 1.0);
    }

    fn expire_penalties(&mut self, now_ns: Nanos) {
        let expired: Vec<SensorKind> = self
            .penalties
            .iter()
            .filter(|(_, p)| p.until_ns <= now_ns)
            .map(|(k, _)| *k)
            .collect();
        for kind in expired {
            self.penalties.remove(&kind);
            self.recalibration_due.push(kind);
        }
    }
}

impl Default for AdaptivePrioritizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Terrain bias per sensor family: urban clutter hammers magnetometry,
/// canopy eats lidar returns, mountains bend the local field.
fn terrain_impact(kind: SensorKind, hint: TerrainHint) -> f64 {
    match (kind, hint) {
        (SensorKind::Lidar, TerrainHint::Forest) => 0.7,
        (SensorKind::Lidar, TerrainHint::Urban) => 0.9,
        (SensorKind::Magnetic, TerrainHint::Urban) => 0.6,
        (SensorKind::Magnetic, TerrainHint::Mountain) => 0.8,
        (SensorKind::Spectral, TerrainHint::Urban) => 0.85,
        (SensorKind::Spectral, TerrainHint::Littoral) => 0.9,
        _ => 1.0,
    }
}
