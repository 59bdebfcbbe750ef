//! Online rating update for a single judged pair.
//!
//! Logistic (Elo-style) expected score, with a per-item step size that grows
//! with the item's remaining uncertainty. The update is asymmetric: winner and
//! loser each move by their own K, so the sum of ratings is not conserved.

use crate::constants::{INITIAL_MU, INITIAL_SIGMA_SQ, K_BASE, LOGISTIC_SCALE, SIGMA_DECAY};
use crate::error::{EngineError, Result};
use crate::types::Rating;

/// Parameters of the rating model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatingConfig {
    pub initial_mu: f64,
    /// Starting variance, and the denominator of the adaptive K.
    pub initial_sigma_sq: f64,
    pub k_base: f64,
    pub sigma_decay: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        RatingConfig {
            initial_mu: INITIAL_MU,
            initial_sigma_sq: INITIAL_SIGMA_SQ,
            k_base: K_BASE,
            sigma_decay: SIGMA_DECAY,
        }
    }
}

impl RatingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.initial_mu.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "initial_mu must be finite, got {}",
                self.initial_mu
            )));
        }
        if !(self.initial_sigma_sq > 0.0 && self.initial_sigma_sq.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "initial_sigma_sq must be positive, got {}",
                self.initial_sigma_sq
            )));
        }
        if !(self.k_base > 0.0 && self.k_base.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "k_base must be positive, got {}",
                self.k_base
            )));
        }
        if !(self.sigma_decay > 0.0 && self.sigma_decay < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "sigma_decay must be in (0, 1), got {}",
                self.sigma_decay
            )));
        }
        Ok(())
    }

    pub fn initial_rating(&self) -> Rating {
        Rating::new(self.initial_mu, self.initial_sigma_sq)
    }

    /// Step size for an item with the given variance.
    pub fn k_factor(&self, sigma_sq: f64) -> f64 {
        self.k_base * (1.0 + sigma_sq / self.initial_sigma_sq)
    }
}

/// Probability that `rating` beats `opponent` under the logistic model.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / LOGISTIC_SCALE))
}

/// New ratings of both sides after one judgment.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatingUpdate {
    pub winner: Rating,
    pub loser: Rating,
    pub expected_winner: f64,
    pub expected_loser: f64,
}

/// Apply one judgment. Pure; the caller persists the result.
pub fn update_ratings(winner: Rating, loser: Rating, config: &RatingConfig) -> RatingUpdate {
    let expected_winner = expected_score(winner.mu, loser.mu);
    let expected_loser = 1.0 - expected_winner;

    let k_winner = config.k_factor(winner.sigma_sq);
    let k_loser = config.k_factor(loser.sigma_sq);

    RatingUpdate {
        winner: Rating {
            mu: winner.mu + k_winner * (1.0 - expected_winner),
            sigma_sq: winner.sigma_sq * config.sigma_decay,
        },
        loser: Rating {
            mu: loser.mu - k_loser * expected_loser,
            sigma_sq: loser.sigma_sq * config.sigma_decay,
        },
        expected_winner,
        expected_loser,
    }
}
