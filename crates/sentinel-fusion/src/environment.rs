//! Environmental context consulted by the prioritizer
//!
//! Read-only within a fusion cycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Atmospheric state around the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atmosphere {
    pub temperature_k: f64,
    pub pressure_pa: f64,
    /// Relative humidity, percent.
    pub humidity_pct: f64,
    /// Meteorological visibility, meters.
    pub visibility_m: f64,
}

impl Default for Atmosphere {
    fn default() -> Self {
        Self {
            temperature_k: 288.15,
            pressure_pa: 101_325.0,
            humidity_pct: 40.0,
            visibility_m: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// Precipitation rate, mm/hr.
    pub precipitation_mm_hr: f64,
    /// Wind speed, m/s.
    pub wind_mps: f64,
    /// Cloud cover fraction in [0, 1].
    pub cloud_cover: f64,
}

impl Default for Weather {
    fn default() -> Self {
        Self {
            precipitation_mm_hr: 0.0,
            wind_mps: 2.0,
            cloud_cover: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerrainHint {
    Open,
    Urban,
    Forest,
    Mountain,
    Littoral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentContext {
    pub atmosphere: Atmosphere,
    pub weather: Weather,
    /// Noise floor per EM band, normalized to [0, 1].
    pub em_background: BTreeMap<String, f64>,
    pub terrain_hint: TerrainHint,
}

impl Default for EnvironmentContext {
    fn default() -> Self {
        let mut em_background = BTreeMap::new();
        em_background.insert("hf".to_string(), 0.02);
        em_background.insert("vhf".to_string(), 0.03);
        em_background.insert("uhf".to_string(), 0.02);
        Self {
            atmosphere: Atmosphere::default(),
            weather: Weather::default(),
            em_background,
            terrain_hint: TerrainHint::Open,
        }
    }
}

impl EnvironmentContext {
    /// Mean normalized EM noise floor across bands.
    pub fn mean_em_noise(&self) -> f64 {
        if self.em_background.is_empty() {
            return 0.0;
        }
        self.em_background.values().sum::<f64>() / self.em_background.len() as f64
    }
}
