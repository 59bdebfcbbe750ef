//! The storage seam the judging engine runs against.
//!
//! Reads are plain snapshots. Every mutation of item ratings goes through
//! [`RatingStore::commit`], which applies all item and comparison writes of one
//! judgment atomically, or none of them if any item changed since it was read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairjudge_core::{Comparison, Item, Rating, Snapshot};

use crate::Result;

/// An item row together with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub item: Item,
    /// Incremented by every committed write to this item.
    pub version: i64,
}

/// New state for one item, valid only if the item is still at `expected_version`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemWrite {
    pub id: String,
    pub rating: Rating,
    pub comparison_count: u32,
    pub expected_version: i64,
}

impl ItemWrite {
    /// Write `rating` over `stored`, adding `judged` to its comparison count.
    pub fn over(stored: &StoredItem, rating: Rating, judged: u32) -> Self {
        ItemWrite {
            id: stored.item.id.clone(),
            rating,
            comparison_count: stored.item.comparison_count + judged,
            expected_version: stored.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonWrite {
    /// First judgment. Only applies while the comparison is still unjudged; the
    /// store assigns the next `judged_seq`.
    Judge {
        comparison_id: String,
        winner_id: String,
        judged_at: DateTime<Utc>,
        snapshot: Snapshot,
    },
    /// New winner for a judged comparison. Snapshot and `judged_seq` stay.
    Revise {
        comparison_id: String,
        winner_id: String,
        judged_at: DateTime<Utc>,
        revision_count: u32,
    },
    /// Recaptured pre-judgment state of a later comparison during a refold.
    Resnapshot {
        comparison_id: String,
        snapshot: Snapshot,
    },
}

/// All writes of one judgment or revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgmentCommit {
    pub items: Vec<ItemWrite>,
    pub comparisons: Vec<ComparisonWrite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Another writer got there first; nothing was written.
    Conflict,
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Fails with `Error::DuplicateItem` if the id is taken.
    async fn insert_item(&self, item: &Item) -> Result<()>;

    /// All items, ordered by id.
    async fn load_items(&self) -> Result<Vec<StoredItem>>;

    async fn load_item(&self, id: &str) -> Result<Option<StoredItem>>;

    async fn load_comparison(&self, id: &str) -> Result<Option<Comparison>>;

    /// A session's comparisons in position order.
    async fn session_comparisons(&self, session_id: &str) -> Result<Vec<Comparison>>;

    /// Append an unjudged comparison. `Conflict` if its session position is taken.
    async fn insert_comparison(&self, comparison: &Comparison) -> Result<CommitOutcome>;

    /// Judged comparisons with `judged_seq > seq`, in `judged_seq` order.
    async fn judged_after(&self, seq: i64) -> Result<Vec<Comparison>>;

    /// Apply every write atomically, or return `Conflict` and write nothing.
    async fn commit(&self, commit: &JudgmentCommit) -> Result<CommitOutcome>;
}
