//! Fusion confidence scoring
//!
//! Per-sensor combined scores blend a temporal component (current score
//! mixed with an exponentially decayed history) and a feature component
//! (persistence of the sensor's measurement stream), 6:4. The overall
//! fusion confidence is the base-weight mean of the combined scores.

use std::collections::{BTreeMap, VecDeque};

use sentinel_core::SensorKind;

const WINDOW: usize = 10;
const TEMPORAL_DECAY: f64 = 0.95;
const TEMPORAL_WEIGHT: f64 = 0.6;
const FEATURE_WEIGHT: f64 = 0.4;
/// Blend of the instantaneous score against the decayed history.
const CURRENT_BLEND: f64 = 0.7;

const EPS: f64 = 1e-9;

#[derive(Default)]
pub struct ConfidenceScorer {
    score_history: BTreeMap<SensorKind, VecDeque<f64>>,
    magnitude_history: BTreeMap<SensorKind, VecDeque<f64>>,
}

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one cycle.
    ///
    /// `current` is each sensor's instantaneous confidence (environment
    /// × health × cross-validation penalty); `magnitudes` are the scalar
    /// measurements for the feature-persistence term.
    pub fn score_cycle(
        &mut self,
        current: &BTreeMap<SensorKind, f64>,
        magnitudes: &BTreeMap<SensorKind, f64>,
    ) -> (BTreeMap<SensorKind, f32>, f32) {
        let mut combined_scores = BTreeMap::new();

        for (&kind, &instantaneous) in current {
            let temporal = match self.decayed_history(kind) {
                Some(hist) => CURRENT_BLEND * instantaneous + (1.0 - CURRENT_BLEND) * hist,
                None => instantaneous,
            };
            let persistence = self.persistence(kind, magnitudes.get(&kind).copied());
            let combined =
                (TEMPORAL_WEIGHT * temporal + FEATURE_WEIGHT * persistence).clamp(0.0, 1.0);
            combined_scores.insert(kind, combined);
        }

        // Record after scoring so this cycle's value weighs on the next.
        for (&kind, &score) in &combined_scores {
            push_bounded(self.score_history.entry(kind).or_default(), score);
        }
        for (&kind, &magnitude) in magnitudes {
            push_bounded(self.magnitude_history.entry(kind).or_default(), magnitude);
        }

        let mut weight_total = 0.0;
        let mut weighted_sum = 0.0;
        for (&kind, &score) in &combined_scores {
            let w = kind.base_weight();
            weight_total += w;
            weighted_sum += w * score;
        }
        let fusion = if weight_total > 0.0 {
            (weighted_sum / weight_total) as f32
        } else {
            0.0
        };

        let per_sensor = combined_scores
            .into_iter()
            .map(|(k, v)| (k, v as f32))
            .collect();
        (per_sensor, fusion)
    }

    /// Exponentially decayed mean of the stored scores, newest weighted
    /// heaviest.
    fn decayed_history(&self, kind: SensorKind) -> Option<f64> {
        let hist = self.score_history.get(&kind)?;
        if hist.is_empty() {
            return None;
        }
        let mut num = 0.0;
        let mut den = 0.0;
        for (age, score) in hist.iter().rev().enumerate() {
            let w = TEMPORAL_DECAY.powi(age as i32);
            num += w * score;
            den += w;
        }
        Some(num / den)
    }

    /// Feature persistence: relative step-to-step stability of the
    /// sensor's measurement stream.
    fn persistence(&self, kind: SensorKind, latest: Option<f64>) -> f64 {
        let Some(hist) = self.magnitude_history.get(&kind) else {
            return latest.map_or(0.5, |_| 1.0);
        };
        let mut series: Vec<f64> = hist.iter().copied().collect();
        if let Some(latest) = latest {
            series.push(latest);
        }
        if series.len() < 2 {
            return 1.0;
        }
        let mean_abs = series.iter().map(|x| x.abs()).sum::<f64>() / series.len() as f64;
        let mean_step = series
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .sum::<f64>()
            / (series.len() - 1) as f64;
        let relative_instability = mean_step / (mean_abs + EPS);
        (1.0 / (1.0 + 10.0 * relative_instability)).clamp(0.0, 1.0)
    }
}

fn push_bounded(buffer: &mut VecDeque<f64>, value: f64) {
    buffer.push_back(value);
    while buffer.len() > WINDOW {
        buffer.pop_front();
    }
}
