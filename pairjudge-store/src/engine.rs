/// Judging engine orchestrator.
///
/// Wraps the pure selector, updater and revision functions of `pairjudge-core`
/// in read-compute-commit cycles against a `RatingStore`. Nothing is cached
/// between calls: every operation re-reads the state it is about to change, and
/// a commit that finds the state moved is retried from scratch.
use std::collections::{HashMap, HashSet};

use chrono::Utc;
use pairjudge_core::{
    compute_reliability, interfering, judge_from, orient_for_presentation, rank_items,
    replay_revision, revise_comparison, select_next_pair, Comparison, EngineError, Item, PairKey,
    RankedItem, RatedItem, RatingConfig, RatingUpdate, RevisionPolicy,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::retry::{retry_on_conflict, Attempt, RetryPolicy};
use crate::store::{CommitOutcome, ComparisonWrite, ItemWrite, JudgmentCommit, RatingStore, StoredItem};
use crate::{Error, Result};

/// Configuration for the judging engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub rating: RatingConfig,
    pub revision_policy: RevisionPolicy,
    pub retry: RetryPolicy,
}

pub struct JudgingEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S: RatingStore> JudgingEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        config.rating.validate()?;
        Ok(JudgingEngine { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Add an item to the rankable set at the initial rating.
    pub async fn add_item(&self, id: &str) -> Result<Item> {
        let item = Item::new(id, self.config.rating.initial_rating());
        self.store.insert_item(&item).await?;
        debug!(item = id, "Added item");
        Ok(item)
    }

    /// Choose the next pair for a session and record it as an unjudged comparison.
    ///
    /// `Ok(None)` means the session has seen every informative pair.
    pub async fn next_pair(&self, session_id: &str) -> Result<Option<Comparison>> {
        retry_on_conflict("next_pair", &self.config.retry, || self.try_next_pair(session_id)).await
    }

    /// Record the first judgment of a comparison.
    pub async fn apply_judgment(&self, comparison_id: &str, winner_id: &str) -> Result<RatingUpdate> {
        retry_on_conflict("apply_judgment", &self.config.retry, || {
            self.try_apply(comparison_id, winner_id)
        })
        .await
    }

    /// Change the winner of a judged comparison.
    ///
    /// Returns the comparison's own re-judged ratings, computed from its
    /// snapshot. Under `RevisionPolicy::Replay` the items' final stored ratings
    /// may differ from these when later judgments were refolded on top.
    pub async fn revise_judgment(&self, comparison_id: &str, new_winner_id: &str) -> Result<RatingUpdate> {
        retry_on_conflict("revise_judgment", &self.config.retry, || {
            self.try_revise(comparison_id, new_winner_id)
        })
        .await
    }

    /// Scale Separation Reliability of the current ratings.
    pub async fn reliability(&self) -> Result<f64> {
        let items = self.store.load_items().await?;
        let judged = self.store.judged_after(0).await?;
        let candidates: Vec<RatedItem> = items.iter().map(|s| s.item.as_candidate()).collect();
        Ok(compute_reliability(&candidates, &judged))
    }

    pub async fn rankings(&self) -> Result<Vec<RankedItem>> {
        let items: Vec<Item> = self.store.load_items().await?.into_iter().map(|s| s.item).collect();
        Ok(rank_items(&items))
    }

    pub async fn session(&self, session_id: &str) -> Result<Vec<Comparison>> {
        self.store.session_comparisons(session_id).await
    }

    async fn load_comparison(&self, comparison_id: &str) -> Result<Comparison> {
        self.store
            .load_comparison(comparison_id)
            .await?
            .ok_or_else(|| Error::UnknownComparison(comparison_id.to_string()))
    }

    async fn load_item(&self, item_id: &str) -> Result<StoredItem> {
        self.store
            .load_item(item_id)
            .await?
            .ok_or_else(|| EngineError::UnknownItem(item_id.to_string()).into())
    }

    async fn try_next_pair(&self, session_id: &str) -> Result<Attempt<Option<Comparison>>> {
        let items = self.store.load_items().await?;
        let shown = self.store.session_comparisons(session_id).await?;

        let excluded: HashSet<PairKey> = shown.iter().map(Comparison::pair_key).collect();
        let candidates: Vec<RatedItem> = items.iter().map(|s| s.item.as_candidate()).collect();

        let Some(pair) = select_next_pair(&candidates, &excluded)? else {
            debug!(session = session_id, shown = shown.len(), "No informative pairs left");
            return Ok(Attempt::Done(None));
        };
        let pair = orient_for_presentation(pair, &mut rand::rng());

        let position = shown.iter().map(|c| c.position + 1).max().unwrap_or(0);
        let comparison = Comparison::pending(Uuid::new_v4().to_string(), session_id, position, pair);

        match self.store.insert_comparison(&comparison).await? {
            CommitOutcome::Committed => {
                debug!(
                    session = session_id,
                    position,
                    left = %comparison.left_item_id,
                    right = %comparison.right_item_id,
                    "Presented pair"
                );
                Ok(Attempt::Done(Some(comparison)))
            }
            CommitOutcome::Conflict => Ok(Attempt::Conflict),
        }
    }

    async fn try_apply(&self, comparison_id: &str, winner_id: &str) -> Result<Attempt<RatingUpdate>> {
        let comparison = self.load_comparison(comparison_id).await?;
        if comparison.is_judged() {
            return Err(EngineError::AlreadyJudged(comparison.id.clone()).into());
        }
        comparison.winner_is_left(winner_id)?;

        let left = self.load_item(&comparison.left_item_id).await?;
        let right = self.load_item(&comparison.right_item_id).await?;

        let step = judge_from(
            &comparison,
            winner_id,
            left.item.rating(),
            right.item.rating(),
            &self.config.rating,
        )?;
        let (new_left, new_right) = step.left_right(&comparison);

        let commit = JudgmentCommit {
            items: vec![
                ItemWrite::over(&left, new_left, 1),
                ItemWrite::over(&right, new_right, 1),
            ],
            comparisons: vec![ComparisonWrite::Judge {
                comparison_id: comparison.id.clone(),
                winner_id: winner_id.to_string(),
                judged_at: Utc::now(),
                snapshot: step.snapshot,
            }],
        };

        match self.store.commit(&commit).await? {
            CommitOutcome::Committed => {
                info!(
                    comparison = %comparison.id,
                    winner = winner_id,
                    loser = %step.loser_id,
                    winner_mu = step.update.winner.mu,
                    loser_mu = step.update.loser.mu,
                    "Applied judgment"
                );
                Ok(Attempt::Done(step.update))
            }
            CommitOutcome::Conflict => Ok(Attempt::Conflict),
        }
    }

    async fn try_revise(&self, comparison_id: &str, new_winner_id: &str) -> Result<Attempt<RatingUpdate>> {
        // Item versions are read before the event log, so any judgment that
        // lands after this point makes the commit conflict.
        let stored: HashMap<String, StoredItem> = self
            .store
            .load_items()
            .await?
            .into_iter()
            .map(|s| (s.item.id.clone(), s))
            .collect();
        let current = |id: &str| {
            stored
                .get(id)
                .ok_or_else(|| Error::from(EngineError::UnknownItem(id.to_string())))
        };

        let comparison = self.load_comparison(comparison_id).await?;
        let revised = revise_comparison(&comparison, new_winner_id, &self.config.rating)?;

        let later = match comparison.judged_seq {
            Some(seq) => self.store.judged_after(seq).await?,
            None => Vec::new(),
        };
        let hits = interfering(&comparison, &later).len();

        let revision_count = if comparison.winner_id.as_deref() == Some(new_winner_id) {
            comparison.revision_count
        } else {
            comparison.revision_count + 1
        };
        let revise_write = ComparisonWrite::Revise {
            comparison_id: comparison.id.clone(),
            winner_id: new_winner_id.to_string(),
            judged_at: Utc::now(),
            revision_count,
        };

        let commit = if hits == 0 || self.config.revision_policy == RevisionPolicy::Restore {
            if hits > 0 {
                warn!(
                    comparison = %comparison.id,
                    later = hits,
                    "Restoring snapshot although later judgments touched these items; their deltas are kept as-is"
                );
            }
            let (new_left, new_right) = revised.left_right(&comparison);
            JudgmentCommit {
                items: vec![
                    ItemWrite::over(current(&comparison.left_item_id)?, new_left, 0),
                    ItemWrite::over(current(&comparison.right_item_id)?, new_right, 0),
                ],
                comparisons: vec![revise_write],
            }
        } else if self.config.revision_policy == RevisionPolicy::Reject {
            return Err(EngineError::RevisionConflict {
                comparison_id: comparison.id.clone(),
                later: hits,
            }
            .into());
        } else {
            let plan = replay_revision(&comparison, new_winner_id, &later, &self.config.rating)?;

            let mut items = Vec::with_capacity(plan.final_ratings.len());
            for (id, rating) in &plan.final_ratings {
                items.push(ItemWrite::over(current(id)?, *rating, 0));
            }

            let mut comparisons = vec![revise_write];
            comparisons.extend(plan.replayed.iter().map(|r| ComparisonWrite::Resnapshot {
                comparison_id: r.comparison_id.clone(),
                snapshot: r.snapshot,
            }));

            info!(
                comparison = %comparison.id,
                replayed = plan.replayed.len(),
                affected_items = items.len(),
                "Refolding later judgments after revision"
            );
            JudgmentCommit { items, comparisons }
        };

        match self.store.commit(&commit).await? {
            CommitOutcome::Committed => {
                info!(
                    comparison = %comparison.id,
                    winner = new_winner_id,
                    revision_count,
                    "Revised judgment"
                );
                Ok(Attempt::Done(revised.update))
            }
            CommitOutcome::Conflict => Ok(Attempt::Conflict),
        }
    }
}
