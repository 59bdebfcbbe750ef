//! Error types for the rating store and judging engine

use pairjudge_core::EngineError;
use thiserror::Error;

/// Result type for store and engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input rejected by the pure engine (bad winner, unjudged revision, ...)
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown comparison: {0}")]
    UnknownComparison(String),

    #[error("Item already exists: {0}")]
    DuplicateItem(String),

    /// Optimistic retries exhausted. The caller may retry the whole judgment.
    #[error("Concurrent update failed after {attempts} attempts")]
    ConcurrentUpdateFailed { attempts: usize },
}
