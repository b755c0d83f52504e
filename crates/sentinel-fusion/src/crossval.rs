//! Pairwise sensor cross-validation
//!
//! For each pair of prioritized kinds, a weighted Pearson correlation
//! over the last ten scalar measurements, weighted by the pair's
//! environmental confidence and an exponential temporal decay (τ = 5
//! samples). Pairs below the threshold drag both sensors' confidence
//! down in proportion to the deficit.

use std::collections::BTreeMap;

use sentinel_core::SensorKind;

use crate::environment::EnvironmentContext;
use crate::prioritizer::AdaptivePrioritizer;

/// Minimum acceptable pairwise correlation.
pub const CORRELATION_THRESHOLD: f64 = 0.75;

/// Measurements kept per kind.
const VALIDATION_WINDOW: usize = 10;

/// Temporal decay constant, in samples.
const DECAY_TAU: f64 = 5.0;

const EPS: f64 = 1e-8;

pub struct CrossValidator {
    history: BTreeMap<SensorKind, Vec<f64>>,
}

impl CrossValidator {
    pub fn new() -> Self {
        Self {
            history: BTreeMap::new(),
        }
    }

    /// Record this cycle's scalar measurement for one kind.
    pub fn observe(&mut self, kind: SensorKind, value: f64) {
        let series = self.history.entry(kind).or_default();
        series.push(value);
        if series.len() > VALIDATION_WINDOW {
            series.remove(0);
        }
    }

    pub fn window_len(&self, kind: SensorKind) -> usize {
        self.history.get(&kind).map_or(0, Vec::len)
    }

    /// Pairwise correlation scores for every ordered pair of kinds with
    /// enough shared history.
    pub fn pair_scores(
        &self,
        prioritizer: &AdaptivePrioritizer,
        env: &EnvironmentContext,
    ) -> BTreeMap<(SensorKind, SensorKind), f64> {
        let mut scores = BTreeMap::new();
        let kinds: Vec<SensorKind> = self.history.keys().copied().collect();
        for (i, &a) in kinds.iter().enumerate() {
            for &b in &kinds[i + 1..] {
                if let Some(corr) = self.pair_correlation(a, b, prioritizer, env) {
                    scores.insert((a, b), corr);
                }
            }
        }
        scores
    }

    /// Multiply per-sensor confidences by the deficit factor of every
    /// failing pair they appear in. Returns the adjusted map.
    pub fn apply_penalties(
        &self,
        mut confidences: BTreeMap<SensorKind, f32>,
        scores: &BTreeMap<(SensorKind, SensorKind), f64>,
    ) -> BTreeMap<SensorKind, f32> {
        for (&(a, b), &corr) in scores {
            if corr >= CORRELATION_THRESHOLD {
                continue;
            }
            // Factor shrinks linearly with the deficit.
            let factor = (corr.max(0.0) / CORRELATION_THRESHOLD) as f32;
            for kind in [a, b] {
                if let Some(conf) = confidences.get_mut(&kind) {
                    *conf *= factor;
                }
            }
        }
        confidences
    }

    fn pair_correlation(
        &self,
        a: SensorKind,
        b: SensorKind,
        prioritizer: &AdaptivePrioritizer,
        env: &EnvironmentContext,
    ) -> Option<f64> {
        let series_a = self.history.get(&a)?;
        let series_b = self.history.get(&b)?;
        let n = series_a.len().min(series_b.len());
        if n < 3 {
            return None;
        }
        let xs = &series_a[series_a.len() - n..];
        let ys = &series_b[series_b.len() - n..];

        let weights = self.confidence_weights(a, b, n, prioritizer, env);
        Some(weighted_correlation(xs, ys, &weights).clamp(0.0, 1.0))
    }

    /// Weights: the pair's joint environmental confidence scaled by an
    /// exponential decay that favors recent samples, normalized to sum
    /// to one.
    fn confidence_weights(
        &self,
        a: SensorKind,
        b: SensorKind,
        n: usize,
        prioritizer: &AdaptivePrioritizer,
        env: &EnvironmentContext,
    ) -> Vec<f64> {
        let joint = prioritizer
            .environmental_score(a, env)
            .min(prioritizer.environmental_score(b, env));
        let mut weights: Vec<f64> = (0..n)
            .map(|i| joint * (-((n - 1 - i) as f64) / DECAY_TAU).exp())
            .collect();
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            for w in &mut weights {
                *w /= total;
            }
        }
        weights
    }
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Weighted Pearson correlation on standardized series.
fn weighted_correlation(xs: &[f64], ys: &[f64], weights: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let std_x = (xs.iter().map(|x| (x - mean_x).powi(2)).sum::<f64>() / n).sqrt();
    let std_y = (ys.iter().map(|y| (y - mean_y).powi(2)).sum::<f64>() / n).sqrt();

    let norm_x: Vec<f64> = xs.iter().map(|x| (x - mean_x) / (std_x + EPS)).collect();
    let norm_y: Vec<f64> = ys.iter().map(|y| (y - mean_y) / (std_y + EPS)).collect();

    let cov: f64 = weights
        .iter()
        .zip(norm_x.iter().zip(norm_y.iter()))
        .map(|(w, (x, y))| w * x * y)
        .sum();
    let var_x: f64 = weights
        .iter()
        .zip(norm_x.iter())
        .map(|(w, x)| w * x * x)
        .sum::<f64>()
        .sqrt();
    let var_y: f64 = weights
        .iter()
        .zip(norm_y.iter())
        .map(|(w, y)| w * y * y)
        .sum::<f64>()
        .sqrt();

    cov / (var_x * var_y + EPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(kinds: &[(SensorKind, fn(usize) -> f64)], n: usize) -> CrossValidator {
        let mut validator = CrossValidator::new();
        for i in 0..n {
            for (kind, f) in kinds {
                validator.observe(*kind, f(i));
            }
        }
        validator
    }

    fn rising(i: usize) -> f64 {
        10.0 + i as f64
    }

    fn falling(i: usize) -> f64 {
        10.0 - i as f64
    }

    #[test]
    fn test_correlated_pair_scores_high() {
        let validator = seeded(
            &[(SensorKind::Lidar, rising), (SensorKind::Magnetic, rising)],
            10,
        );
        let prioritizer = AdaptivePrioritizer::new();
        let scores = validator.pair_scores(&prioritizer, &EnvironmentContext::default());
        let corr = scores[&(SensorKind::Lidar, SensorKind::Magnetic)];
        assert!(corr > 0.95, "corr = {corr}");
    }

    #[test]
    fn test_anticorrelated_pair_scores_low() {
        let validator = seeded(
            &[(SensorKind::Lidar, rising), (SensorKind::Magnetic, falling)],
            10,
        );
        let prioritizer = AdaptivePrioritizer::new();
        let scores = validator.pair_scores(&prioritizer, &EnvironmentContext::default());
        let corr = scores[&(SensorKind::Lidar, SensorKind::Magnetic)];
        assert!(corr < CORRELATION_THRESHOLD, "corr = {corr}");
    }

    #[test]
    fn test_penalty_reduces_both_sensors() {
        let validator = seeded(
            &[(SensorKind::Lidar, rising), (SensorKind::Magnetic, falling)],
            10,
        );
        let prioritizer = AdaptivePrioritizer::new();
        let scores = validator.pair_scores(&prioritizer, &EnvironmentContext::default());

        let mut confidences = BTreeMap::new();
        confidences.insert(SensorKind::Lidar, 0.9f32);
        confidences.insert(SensorKind::Magnetic, 0.9f32);
        let adjusted = validator.apply_penalties(confidences, &scores);

        assert!(adjusted[&SensorKind::Lidar] < 0.9);
        assert!(adjusted[&SensorKind::Magnetic] < 0.9);
    }

    #[test]
    fn test_passing_pair_keeps_confidence() {
        let validator = seeded(
            &[(SensorKind::Lidar, rising), (SensorKind::Magnetic, rising)],
            10,
        );
        let prioritizer = AdaptivePrioritizer::new();
        let scores = validator.pair_scores(&prioritizer, &EnvironmentContext::default());

        let mut confidences = BTreeMap::new();
        confidences.insert(SensorKind::Lidar, 0.9f32);
        confidences.insert(SensorKind::Magnetic, 0.9f32);
        let adjusted = validator.apply_penalties(confidences, &scores);
        assert_eq!(adjusted[&SensorKind::Lidar], 0.9);
    }

    #[test]
    fn test_short_history_yields_no_score() {
        let validator = seeded(
            &[(SensorKind::Lidar, rising), (SensorKind::Magnetic, rising)],
            2,
        );
        let prioritizer = AdaptivePrioritizer::new();
        assert!(validator
            .pair_scores(&prioritizer, &EnvironmentContext::default())
            .is_empty());
    }

    #[test]
    fn test_window_is_bounded() {
        let mut validator = CrossValidator::new();
        for i in 0..50 {
            validator.observe(SensorKind::Lidar, i as f64);
        }
        assert_eq!(validator.window_len(SensorKind::Lidar), 10);
    }
}
