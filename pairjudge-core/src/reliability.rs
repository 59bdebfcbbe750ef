//! Ranking quality signal for operators.
//!
//! Scale Separation Reliability: the share of observed rating spread that is
//! not explained by remaining measurement noise. Near 1 the ranking is stable,
//! near 0 noise dominates and more judgments are needed.

use crate::types::{Comparison, RatedItem};

/// A pluggable reliability formula.
pub trait ReliabilityEstimator {
    /// Value in `[0, 1]`. Must not fail on empty or degenerate input.
    fn estimate(&self, items: &[RatedItem], judged: &[Comparison]) -> f64;
}

/// `clamp((V - N) / V, 0, 1)` with `V` the population variance of `mu` and `N`
/// the mean `sigma_sq`. Only needs current ratings; the comparison log is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleSeparation;

impl ReliabilityEstimator for ScaleSeparation {
    fn estimate(&self, items: &[RatedItem], _judged: &[Comparison]) -> f64 {
        if items.is_empty() {
            return 0.0;
        }
        let n = items.len() as f64;
        let mean_mu = items.iter().map(|i| i.mu).sum::<f64>() / n;
        let variance = items.iter().map(|i| (i.mu - mean_mu).powi(2)).sum::<f64>() / n;
        if !(variance > 0.0) {
            return 0.0;
        }
        let noise = items.iter().map(|i| i.sigma_sq).sum::<f64>() / n;
        ((variance - noise) / variance).clamp(0.0, 1.0)
    }
}

/// Scale Separation Reliability of the current ratings.
pub fn compute_reliability(items: &[RatedItem], judged: &[Comparison]) -> f64 {
    ScaleSeparation.estimate(items, judged)
}
