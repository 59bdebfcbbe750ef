//! Changing the winner of an already judged comparison.
//!
//! Ratings are order dependent, so a judgment cannot be undone by applying an
//! inverse update. Instead the two items are rolled back to the snapshot taken
//! when the comparison was first judged and the new outcome is applied from
//! there.
//!
//! That restore is exact only while no later judgment has touched either item.
//! When one has, `replay_revision` refolds the event log from the revised
//! comparison forward: every later judgment that touches an affected item is
//! recomputed from its (possibly changed) starting state, and the other item of
//! that judgment joins the affected set.

use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::rating::{update_ratings, RatingConfig, RatingUpdate};
use crate::types::{Comparison, Rating, Snapshot};

/// How to revise when later judgments have touched the comparison's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RevisionPolicy {
    /// Restore the snapshot and reapply; later judgments keep their old deltas.
    Restore,
    /// Refuse with `EngineError::RevisionConflict`.
    Reject,
    /// Refold every later judgment that depends on the revised one.
    #[default]
    Replay,
}

impl std::str::FromStr for RevisionPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "restore" => Ok(RevisionPolicy::Restore),
            "reject" => Ok(RevisionPolicy::Reject),
            "replay" => Ok(RevisionPolicy::Replay),
            other => Err(EngineError::InvalidConfig(format!(
                "unknown revision policy \"{other}\"; use restore, reject or replay"
            ))),
        }
    }
}

/// Outcome of re-judging one comparison from its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisedComparison {
    pub winner_id: String,
    pub loser_id: String,
    pub update: RatingUpdate,
    /// Unchanged pre-judgment state; persisted again as-is.
    pub snapshot: Snapshot,
}

impl RevisedComparison {
    /// New ratings in the comparison's left/right order.
    pub fn left_right(&self, comparison: &Comparison) -> (Rating, Rating) {
        if comparison.left_item_id == self.winner_id {
            (self.update.winner, self.update.loser)
        } else {
            (self.update.loser, self.update.winner)
        }
    }
}

/// Apply a judgment on `comparison` to the given left/right starting ratings.
///
/// Shared by forward judgments and every step of a refold.
pub fn judge_from(
    comparison: &Comparison,
    winner_id: &str,
    left: Rating,
    right: Rating,
    config: &RatingConfig,
) -> Result<RevisedComparison> {
    let winner_is_left = comparison.winner_is_left(winner_id)?;
    let (winner, loser, loser_id) = if winner_is_left {
        (left, right, &comparison.right_item_id)
    } else {
        (right, left, &comparison.left_item_id)
    };

    Ok(RevisedComparison {
        winner_id: winner_id.to_string(),
        loser_id: loser_id.clone(),
        update: update_ratings(winner, loser, config),
        snapshot: Snapshot { left, right },
    })
}

/// Restore the comparison's snapshot and apply `new_winner_id` from there.
pub fn revise_comparison(
    comparison: &Comparison,
    new_winner_id: &str,
    config: &RatingConfig,
) -> Result<RevisedComparison> {
    let snapshot = match (&comparison.winner_id, comparison.snapshot) {
        (Some(_), Some(snapshot)) => snapshot,
        _ => return Err(EngineError::NotYetJudged(comparison.id.clone())),
    };
    judge_from(comparison, new_winner_id, snapshot.left, snapshot.right, config)
}

/// Judged comparisons after `target` in event order that touch either of its items.
pub fn interfering<'a>(target: &Comparison, judged: &'a [Comparison]) -> Vec<&'a Comparison> {
    let Some(seq) = target.judged_seq else {
        return Vec::new();
    };
    judged
        .iter()
        .filter(|c| c.id != target.id && c.is_judged())
        .filter(|c| c.judged_seq.is_some_and(|s| s > seq))
        .filter(|c| c.involves(&target.left_item_id) || c.involves(&target.right_item_id))
        .collect()
}

/// A later comparison recomputed during a refold.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedComparison {
    pub comparison_id: String,
    /// New pre-judgment state of this comparison's items.
    pub snapshot: Snapshot,
}

/// Everything a refold changes, ready to be committed in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayPlan {
    pub revised: RevisedComparison,
    /// Later comparisons whose snapshots changed, in event order.
    pub replayed: Vec<ReplayedComparison>,
    /// Final rating of every item the refold touched.
    pub final_ratings: BTreeMap<String, Rating>,
}

/// Revise `target` and refold the later judged comparisons in `later`.
///
/// `later` may contain unrelated or earlier comparisons; only judged ones after
/// `target` in event order are considered, sorted by `judged_seq`.
pub fn replay_revision(
    target: &Comparison,
    new_winner_id: &str,
    later: &[Comparison],
    config: &RatingConfig,
) -> Result<ReplayPlan> {
    let revised = revise_comparison(target, new_winner_id, config)?;
    let seq = target
        .judged_seq
        .ok_or_else(|| EngineError::NotYetJudged(target.id.clone()))?;

    let mut state: BTreeMap<String, Rating> = BTreeMap::new();
    state.insert(revised.winner_id.clone(), revised.update.winner);
    state.insert(revised.loser_id.clone(), revised.update.loser);

    let mut events: Vec<&Comparison> = later
        .iter()
        .filter(|c| c.id != target.id && c.is_judged())
        .filter(|c| c.judged_seq.is_some_and(|s| s > seq))
        .collect();
    events.sort_by_key(|c| c.judged_seq);

    let mut replayed = Vec::new();
    for event in events {
        let left_affected = state.contains_key(&event.left_item_id);
        let right_affected = state.contains_key(&event.right_item_id);
        if !left_affected && !right_affected {
            continue;
        }

        // An item not yet affected is still exactly where this event's snapshot
        // recorded it.
        let (Some(snapshot), Some(winner_id)) = (event.snapshot, event.winner_id.as_deref()) else {
            return Err(EngineError::NotYetJudged(event.id.clone()));
        };
        let left = state.get(&event.left_item_id).copied().unwrap_or(snapshot.left);
        let right = state.get(&event.right_item_id).copied().unwrap_or(snapshot.right);

        let step = judge_from(event, winner_id, left, right, config)?;
        let (new_left, new_right) = step.left_right(event);
        state.insert(event.left_item_id.clone(), new_left);
        state.insert(event.right_item_id.clone(), new_right);

        replayed.push(ReplayedComparison {
            comparison_id: event.id.clone(),
            snapshot: step.snapshot,
        });
    }

    Ok(ReplayPlan {
        revised,
        replayed,
        final_ratings: state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pair;
    use std::collections::HashMap;

    /// Minimal in-memory event log: applies judgments forward the way a store does.
    struct Log {
        ratings: HashMap<String, Rating>,
        comparisons: Vec<Comparison>,
        config: RatingConfig,
    }

    impl Log {
        fn new(ids: &[&str]) -> Self {
            let config = RatingConfig::default();
            let ratings = ids.iter().map(|id| (id.to_string(), config.initial_rating())).collect();
            Log { ratings, comparisons: Vec::new(), config }
        }

        fn judge(&mut self, left: &str, right: &str, winner: &str) -> usize {
            let idx = self.comparisons.len();
            let mut c = Comparison::pending(format!("c{idx}"), "s", idx as u32, Pair::new(left, right));
            let step = judge_from(&c, winner, self.ratings[left], self.ratings[right], &self.config).unwrap();
            let (l, r) = step.left_right(&c);
            self.ratings.insert(left.into(), l);
            self.ratings.insert(right.into(), r);
            c.winner_id = Some(winner.into());
            c.snapshot = Some(step.snapshot);
            c.judged_seq = Some(idx as i64 + 1);
            self.comparisons.push(c);
            idx
        }
    }

    #[test]
    fn test_revise_unjudged_fails() {
        let c = Comparison::pending("c0", "s", 0, Pair::new("a", "b"));
        assert_eq!(
            revise_comparison(&c, "a", &RatingConfig::default()),
            Err(EngineError::NotYetJudged("c0".into()))
        );
    }

    #[test]
    fn test_revise_invalid_winner() {
        let mut log = Log::new(&["a", "b"]);
        let idx = log.judge("a", "b", "a");
        let result = revise_comparison(&log.comparisons[idx], "z", &log.config);
        assert!(matches!(result, Err(EngineError::InvalidWinner { .. })));
    }

    #[test]
    fn test_round_trip_reproduces_stored_ratings() {
        let mut log = Log::new(&["a", "b", "c"]);
        log.judge("a", "c", "c");
        let idx = log.judge("b", "a", "a");

        let revised = revise_comparison(&log.comparisons[idx], "a", &log.config).unwrap();
        let (left, right) = revised.left_right(&log.comparisons[idx]);
        assert_eq!(left, log.ratings["b"]);
        assert_eq!(right, log.ratings["a"]);
        assert_eq!(revised.snapshot, log.comparisons[idx].snapshot.unwrap());
    }

    #[test]
    fn test_flip_without_interference() {
        let mut log = Log::new(&["a", "b"]);
        let idx = log.judge("a", "b", "a");
        let revised = revise_comparison(&log.comparisons[idx], "b", &log.config).unwrap();

        assert_eq!(revised.winner_id, "b");
        assert_eq!(revised.update.winner.mu, 1532.0);
        assert_eq!(revised.update.loser.mu, 1468.0);
        assert!(interfering(&log.comparisons[idx], &log.comparisons).is_empty());
    }

    #[test]
    fn test_interference_detected() {
        let mut log = Log::new(&["a", "b", "c", "d"]);
        let first = log.judge("a", "b", "a");
        log.judge("c", "d", "c");
        log.judge("b", "c", "c");

        let hits = interfering(&log.comparisons[first], &log.comparisons);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c2");
    }

    #[test]
    fn test_replay_matches_refold_from_scratch() {
        let mut log = Log::new(&["a", "b", "c", "d"]);
        let first = log.judge("a", "b", "a");
        log.judge("c", "d", "d");
        log.judge("b", "c", "b");
        log.judge("d", "a", "d");

        let plan = replay_revision(&log.comparisons[first], "b", &log.comparisons, &log.config).unwrap();

        let mut expected = Log::new(&["a", "b", "c", "d"]);
        expected.judge("a", "b", "b");
        expected.judge("c", "d", "d");
        expected.judge("b", "c", "b");
        expected.judge("d", "a", "d");

        for (id, rating) in &plan.final_ratings {
            assert_eq!(*rating, expected.ratings[id], "item {id}");
        }
        // c1 (c vs d) precedes any affected judgment and is untouched.
        let replayed: Vec<&str> = plan.replayed.iter().map(|r| r.comparison_id.as_str()).collect();
        assert_eq!(replayed, vec!["c2", "c3"]);
        assert_eq!(plan.replayed[0].snapshot, expected.comparisons[2].snapshot.unwrap());
    }

    #[test]
    fn test_replay_without_interference_equals_restore() {
        let mut log = Log::new(&["a", "b", "c", "d"]);
        let idx = log.judge("a", "b", "a");
        log.judge("c", "d", "c");

        let plan = replay_revision(&log.comparisons[idx], "b", &log.comparisons, &log.config).unwrap();
        let restored = revise_comparison(&log.comparisons[idx], "b", &log.config).unwrap();

        assert!(plan.replayed.is_empty());
        assert_eq!(plan.revised, restored);
        assert_eq!(plan.final_ratings["b"], restored.update.winner);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("replay".parse::<RevisionPolicy>().unwrap(), RevisionPolicy::Replay);
        assert_eq!("reject".parse::<RevisionPolicy>().unwrap(), RevisionPolicy::Reject);
        assert!("undo".parse::<RevisionPolicy>().is_err());
    }
}
