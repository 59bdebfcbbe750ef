//! # pairjudge-store
//!
//! Durable, transactional side of the comparative-judgment engine:
//! - `RatingStore` trait: item rows with optimistic versions, the append-only
//!   comparison log, and atomic judgment commits
//! - `SqliteStore` (sqlx, WAL) and `MemoryStore` backends
//! - `JudgingEngine`: next pair, apply judgment, revise judgment, reliability,
//!   each as a retried read-compute-commit cycle

pub mod engine;
pub mod error;
pub mod memory;
pub mod retry;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use engine::{EngineConfig, JudgingEngine};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{CommitOutcome, ComparisonWrite, ItemWrite, JudgmentCommit, RatingStore, StoredItem};
