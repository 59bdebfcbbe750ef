//! pairjudge-core: Pure-computation comparative-judgment engine.
//!
//! Pairwise judgments → online ratings with uncertainty → adaptive next pair,
//! revisable history, and a reliability signal. No IO, no database, no clock
//! reads beyond the timestamps callers put on comparisons.
//!
//! Items are identified by caller-provided string IDs.
//!
//! # Quick start
//!
//! ```rust
//! use std::collections::HashSet;
//! use pairjudge_core::{select_next_pair, update_ratings, RatedItem, RatingConfig};
//!
//! let config = RatingConfig::default();
//! let items = vec![
//!     RatedItem::new("essay-1", config.initial_rating()),
//!     RatedItem::new("essay-2", config.initial_rating()),
//! ];
//!
//! let pair = select_next_pair(&items, &HashSet::new()).unwrap().unwrap();
//! assert_eq!(pair.left, "essay-1");
//!
//! // The judge preferred essay-2.
//! let update = update_ratings(items[1].rating(), items[0].rating(), &config);
//! assert_eq!(update.winner.mu, 1532.0);
//! assert_eq!(update.loser.mu, 1468.0);
//! ```

pub mod constants;
pub mod error;
pub mod pairing;
pub mod ranking;
pub mod rating;
pub mod reliability;
pub mod revision;
pub mod types;

// Re-export primary public API at crate root.
pub use error::{EngineError, Result};
pub use pairing::{calculate_info_gain, orient_for_presentation, select_next_pair};
pub use ranking::rank_items;
pub use rating::{expected_score, update_ratings, RatingConfig, RatingUpdate};
pub use reliability::{compute_reliability, ReliabilityEstimator, ScaleSeparation};
pub use revision::{
    interfering, judge_from, replay_revision, revise_comparison, ReplayPlan, ReplayedComparison,
    RevisedComparison, RevisionPolicy,
};
pub use types::{
    Comparison, ComparisonState, Item, Pair, PairKey, RankedItem, RatedItem, Rating, Snapshot,
};
