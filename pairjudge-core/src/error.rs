//! Error kinds surfaced by the pure engine functions.
//!
//! Each failure a caller may want to render differently gets its own variant.
//! "No more informative pairs" is deliberately absent: it is `Ok(None)` from the
//! selector, not an error.

use thiserror::Error;

/// Result alias for the core crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The selector needs at least two items to form a pair.
    #[error("need at least 2 candidate items, got {found}")]
    InsufficientCandidates { found: usize },

    /// The proposed winner is neither item of the comparison.
    #[error("item {winner_id} is not part of comparison {comparison_id}")]
    InvalidWinner {
        comparison_id: String,
        winner_id: String,
    },

    /// Revision was requested for a comparison that has no recorded judgment.
    #[error("comparison {0} has not been judged yet")]
    NotYetJudged(String),

    /// A forward judgment was requested for a comparison that already has one.
    #[error("comparison {0} is already judged; revise it instead")]
    AlreadyJudged(String),

    /// A comparison references an item the rating state does not know.
    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// Later judgments touched the revised comparison's items and the active
    /// policy refuses to revise in that case.
    #[error("comparison {comparison_id} cannot be revised: {later} later judgment(s) touch its items")]
    RevisionConflict { comparison_id: String, later: usize },

    /// Rating parameters out of range.
    #[error("invalid rating configuration: {0}")]
    InvalidConfig(String),
}
