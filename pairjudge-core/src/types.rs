use std::fmt;

use chrono::{DateTime, Utc};

use crate::constants::PAIR_KEY_SEPARATOR;
use crate::error::{EngineError, Result};

/// Point estimate and uncertainty of one item.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rating {
    pub mu: f64,
    /// Variance of the estimate. Never negative, never increases.
    pub sigma_sq: f64,
}

impl Rating {
    pub fn new(mu: f64, sigma_sq: f64) -> Self {
        Rating { mu, sigma_sq }
    }
}

/// Candidate view of an item, as the pair selector sees it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatedItem {
    pub id: String,
    pub mu: f64,
    pub sigma_sq: f64,
}

impl RatedItem {
    pub fn new(id: impl Into<String>, rating: Rating) -> Self {
        RatedItem {
            id: id.into(),
            mu: rating.mu,
            sigma_sq: rating.sigma_sq,
        }
    }

    pub fn rating(&self) -> Rating {
        Rating::new(self.mu, self.sigma_sq)
    }
}

/// An item being ranked, with its judgment tally.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Item {
    pub id: String,
    pub mu: f64,
    pub sigma_sq: f64,
    /// Number of judged comparisons this item took part in.
    pub comparison_count: u32,
}

impl Item {
    pub fn new(id: impl Into<String>, initial: Rating) -> Self {
        Item {
            id: id.into(),
            mu: initial.mu,
            sigma_sq: initial.sigma_sq,
            comparison_count: 0,
        }
    }

    pub fn rating(&self) -> Rating {
        Rating::new(self.mu, self.sigma_sq)
    }

    pub fn as_candidate(&self) -> RatedItem {
        RatedItem::new(self.id.clone(), self.rating())
    }
}

/// Order-independent key for an unordered pair: `(A, B)` and `(B, A)` collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairKey(String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        PairKey(format!("{lo}{PAIR_KEY_SEPARATOR}{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two items to show side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pair {
    pub left: String,
    pub right: String,
}

impl Pair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Pair {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.left, &self.right)
    }
}

/// Ratings of both shown items immediately before a comparison's update was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub left: Rating,
    pub right: Rating,
}

/// Lifecycle of a single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComparisonState {
    Unjudged,
    Judged,
    /// Judged, and its winner has been changed at least once since.
    Rejudged,
}

/// One pairwise judgment event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Comparison {
    pub id: String,
    pub session_id: String,
    /// 0-based order within the session.
    pub position: u32,
    pub left_item_id: String,
    pub right_item_id: String,
    pub winner_id: Option<String>,
    pub judged_at: Option<DateTime<Utc>>,
    /// Set together with `winner_id`; only revision rewrites it.
    pub snapshot: Option<Snapshot>,
    /// Store-wide order of first judgment. Kept across revisions so the event
    /// log can be refolded in its original order.
    pub judged_seq: Option<i64>,
    pub revision_count: u32,
}

impl Comparison {
    /// A freshly presented, unjudged comparison.
    pub fn pending(
        id: impl Into<String>,
        session_id: impl Into<String>,
        position: u32,
        pair: Pair,
    ) -> Self {
        Comparison {
            id: id.into(),
            session_id: session_id.into(),
            position,
            left_item_id: pair.left,
            right_item_id: pair.right,
            winner_id: None,
            judged_at: None,
            snapshot: None,
            judged_seq: None,
            revision_count: 0,
        }
    }

    pub fn state(&self) -> ComparisonState {
        match (&self.winner_id, self.revision_count) {
            (None, _) => ComparisonState::Unjudged,
            (Some(_), 0) => ComparisonState::Judged,
            (Some(_), _) => ComparisonState::Rejudged,
        }
    }

    pub fn is_judged(&self) -> bool {
        self.winner_id.is_some()
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.left_item_id, &self.right_item_id)
    }

    pub fn involves(&self, item_id: &str) -> bool {
        self.left_item_id == item_id || self.right_item_id == item_id
    }

    /// Returns `true` if `winner_id` sits on the left, `false` if on the right.
    pub fn winner_is_left(&self, winner_id: &str) -> Result<bool> {
        if winner_id == self.left_item_id {
            Ok(true)
        } else if winner_id == self.right_item_id {
            Ok(false)
        } else {
            Err(EngineError::InvalidWinner {
                comparison_id: self.id.clone(),
                winner_id: winner_id.to_string(),
            })
        }
    }

    /// Id of the other item, given a valid winner.
    pub fn loser_of(&self, winner_id: &str) -> Result<&str> {
        if self.winner_is_left(winner_id)? {
            Ok(&self.right_item_id)
        } else {
            Ok(&self.left_item_id)
        }
    }
}

/// An item's position in the current ranking with its 95% interval.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankedItem {
    pub id: String,
    pub mu: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub comparison_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_order_independent() {
        assert_eq!(PairKey::new("a", "b"), PairKey::new("b", "a"));
        assert_eq!(PairKey::new("a", "b").as_str(), "a|b");
        assert_ne!(PairKey::new("a", "b"), PairKey::new("a", "c"));
    }

    #[test]
    fn test_comparison_state_machine() {
        let mut c = Comparison::pending("c1", "s1", 0, Pair::new("x", "y"));
        assert_eq!(c.state(), ComparisonState::Unjudged);

        c.winner_id = Some("x".into());
        assert_eq!(c.state(), ComparisonState::Judged);

        c.revision_count = 1;
        assert_eq!(c.state(), ComparisonState::Rejudged);
    }

    #[test]
    fn test_loser_of_rejects_outsider() {
        let c = Comparison::pending("c1", "s1", 0, Pair::new("x", "y"));
        assert_eq!(c.loser_of("x").unwrap(), "y");
        assert_eq!(c.loser_of("y").unwrap(), "x");
        assert!(matches!(c.loser_of("z"), Err(EngineError::InvalidWinner { .. })));
    }
}
