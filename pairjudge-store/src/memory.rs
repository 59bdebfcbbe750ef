//! In-process rating store.
//!
//! Same contract as the SQLite store, guarded by a single async mutex. Useful
//! for embedding the engine without a database and for tests that hammer the
//! optimistic commit path.

use std::collections::BTreeMap;

use async_trait::async_trait;
use pairjudge_core::{Comparison, EngineError, Item};
use tokio::sync::Mutex;

use crate::store::{CommitOutcome, ComparisonWrite, JudgmentCommit, RatingStore, StoredItem};
use crate::{Error, Result};

#[derive(Default)]
struct State {
    items: BTreeMap<String, StoredItem>,
    comparisons: BTreeMap<String, Comparison>,
    last_seq: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    /// Check every guard of a commit without touching anything.
    fn accepts(&self, commit: &JudgmentCommit) -> Result<bool> {
        for write in &commit.items {
            let stored = self
                .items
                .get(&write.id)
                .ok_or_else(|| EngineError::UnknownItem(write.id.clone()))?;
            if stored.version != write.expected_version {
                return Ok(false);
            }
        }
        for write in &commit.comparisons {
            let (id, must_be_judged) = match write {
                ComparisonWrite::Judge { comparison_id, .. } => (comparison_id, false),
                ComparisonWrite::Revise { comparison_id, .. }
                | ComparisonWrite::Resnapshot { comparison_id, .. } => (comparison_id, true),
            };
            let comparison = self
                .comparisons
                .get(id)
                .ok_or_else(|| Error::UnknownComparison(id.clone()))?;
            if comparison.is_judged() != must_be_judged {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl RatingStore for MemoryStore {
    async fn insert_item(&self, item: &Item) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.items.contains_key(&item.id) {
            return Err(Error::DuplicateItem(item.id.clone()));
        }
        state.items.insert(
            item.id.clone(),
            StoredItem {
                item: item.clone(),
                version: 0,
            },
        );
        Ok(())
    }

    async fn load_items(&self) -> Result<Vec<StoredItem>> {
        let state = self.state.lock().await;
        Ok(state.items.values().cloned().collect())
    }

    async fn load_item(&self, id: &str) -> Result<Option<StoredItem>> {
        let state = self.state.lock().await;
        Ok(state.items.get(id).cloned())
    }

    async fn load_comparison(&self, id: &str) -> Result<Option<Comparison>> {
        let state = self.state.lock().await;
        Ok(state.comparisons.get(id).cloned())
    }

    async fn session_comparisons(&self, session_id: &str) -> Result<Vec<Comparison>> {
        let state = self.state.lock().await;
        let mut found: Vec<Comparison> = state
            .comparisons
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.position);
        Ok(found)
    }

    async fn insert_comparison(&self, comparison: &Comparison) -> Result<CommitOutcome> {
        let mut state = self.state.lock().await;
        for id in [&comparison.left_item_id, &comparison.right_item_id] {
            if !state.items.contains_key(id) {
                return Err(EngineError::UnknownItem(id.clone()).into());
            }
        }
        let position_taken = state
            .comparisons
            .values()
            .any(|c| c.session_id == comparison.session_id && c.position == comparison.position);
        if position_taken || state.comparisons.contains_key(&comparison.id) {
            return Ok(CommitOutcome::Conflict);
        }
        state
            .comparisons
            .insert(comparison.id.clone(), comparison.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn judged_after(&self, seq: i64) -> Result<Vec<Comparison>> {
        let state = self.state.lock().await;
        let mut found: Vec<Comparison> = state
            .comparisons
            .values()
            .filter(|c| c.judged_seq.is_some_and(|s| s > seq))
            .cloned()
            .collect();
        found.sort_by_key(|c| c.judged_seq);
        Ok(found)
    }

    async fn commit(&self, commit: &JudgmentCommit) -> Result<CommitOutcome> {
        let mut state = self.state.lock().await;
        if !state.accepts(commit)? {
            return Ok(CommitOutcome::Conflict);
        }

        for write in &commit.items {
            if let Some(stored) = state.items.get_mut(&write.id) {
                stored.item.mu = write.rating.mu;
                stored.item.sigma_sq = write.rating.sigma_sq;
                stored.item.comparison_count = write.comparison_count;
                stored.version += 1;
            }
        }

        for write in &commit.comparisons {
            match write {
                ComparisonWrite::Judge {
                    comparison_id,
                    winner_id,
                    judged_at,
                    snapshot,
                } => {
                    state.last_seq += 1;
                    let seq = state.last_seq;
                    if let Some(c) = state.comparisons.get_mut(comparison_id) {
                        c.winner_id = Some(winner_id.clone());
                        c.judged_at = Some(*judged_at);
                        c.snapshot = Some(*snapshot);
                        c.judged_seq = Some(seq);
                    }
                }
                ComparisonWrite::Revise {
                    comparison_id,
                    winner_id,
                    judged_at,
                    revision_count,
                } => {
                    if let Some(c) = state.comparisons.get_mut(comparison_id) {
                        c.winner_id = Some(winner_id.clone());
                        c.judged_at = Some(*judged_at);
                        c.revision_count = *revision_count;
                    }
                }
                ComparisonWrite::Resnapshot {
                    comparison_id,
                    snapshot,
                } => {
                    if let Some(c) = state.comparisons.get_mut(comparison_id) {
                        c.snapshot = Some(*snapshot);
                    }
                }
            }
        }

        Ok(CommitOutcome::Committed)
    }
}
