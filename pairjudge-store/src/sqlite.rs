//! SQLite-backed rating store (sqlx)
//!
//! Items and comparisons live in two tables. A judgment commit is one
//! transaction of guarded `UPDATE`s: item rows must still carry the version the
//! engine read, and comparison rows must still be in the expected judged state.
//! A guard that matches no row rolls the whole transaction back and reports a
//! conflict; so does a lock timeout from a competing writer.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairjudge_core::{Comparison, EngineError, Item, Rating, Snapshot};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::store::{CommitOutcome, ComparisonWrite, JudgmentCommit, RatingStore, StoredItem};
use crate::{Error, Result};

const COMPARISON_COLUMNS: &str = "id, session_id, position, left_item_id, right_item_id, \
     winner_id, judged_at, prev_left_mu, prev_left_sigma_sq, prev_right_mu, prev_right_sigma_sq, \
     judged_seq, revision_count";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and ensure the schema.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // WAL lets readers proceed alongside the single writer; the busy timeout
        // makes competing writers wait before surfacing "database is locked".
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        if newly_created {
            info!("Initialized new rating database: {}", db_path.display());
        } else {
            info!("Opened existing rating database: {}", db_path.display());
        }

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool. Creates tables if they do not exist.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        create_items_table(&pool).await?;
        create_comparisons_table(&pool).await?;
        Ok(SqliteStore { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn try_commit(&self, commit: &JudgmentCommit) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        for write in &commit.items {
            let updated = sqlx::query(
                "UPDATE items SET mu = ?, sigma_sq = ?, comparison_count = ?, version = version + 1 \
                 WHERE id = ? AND version = ?",
            )
            .bind(write.rating.mu)
            .bind(write.rating.sigma_sq)
            .bind(write.comparison_count)
            .bind(&write.id)
            .bind(write.expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                debug!(item = %write.id, expected_version = write.expected_version, "Item version moved, rolling back");
                tx.rollback().await?;
                return Ok(CommitOutcome::Conflict);
            }
        }

        for write in &commit.comparisons {
            if apply_comparison_write(&mut tx, write).await? == 0 {
                tx.rollback().await?;
                return Ok(CommitOutcome::Conflict);
            }
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }
}

async fn create_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            mu REAL NOT NULL,
            sigma_sq REAL NOT NULL CHECK (sigma_sq >= 0),
            comparison_count INTEGER NOT NULL DEFAULT 0 CHECK (comparison_count >= 0),
            version INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_comparisons_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comparisons (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            left_item_id TEXT NOT NULL REFERENCES items(id),
            right_item_id TEXT NOT NULL REFERENCES items(id),
            winner_id TEXT REFERENCES items(id),
            judged_at TEXT,
            prev_left_mu REAL,
            prev_left_sigma_sq REAL,
            prev_right_mu REAL,
            prev_right_sigma_sq REAL,
            judged_seq INTEGER UNIQUE,
            revision_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE (session_id, position),
            CHECK (left_item_id <> right_item_id),
            CHECK (winner_id IS NULL OR winner_id IN (left_item_id, right_item_id))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_comparisons_judged_seq ON comparisons(judged_seq)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Returns the number of rows the guarded update touched (0 = guard failed).
async fn apply_comparison_write(
    tx: &mut Transaction<'_, Sqlite>,
    write: &ComparisonWrite,
) -> Result<u64> {
    let result = match write {
        ComparisonWrite::Judge {
            comparison_id,
            winner_id,
            judged_at,
            snapshot,
        } => {
            sqlx::query(
                r#"
                UPDATE comparisons
                SET winner_id = ?, judged_at = ?,
                    prev_left_mu = ?, prev_left_sigma_sq = ?,
                    prev_right_mu = ?, prev_right_sigma_sq = ?,
                    judged_seq = (SELECT COALESCE(MAX(judged_seq), 0) + 1 FROM comparisons)
                WHERE id = ? AND winner_id IS NULL
                "#,
            )
            .bind(winner_id)
            .bind(judged_at)
            .bind(snapshot.left.mu)
            .bind(snapshot.left.sigma_sq)
            .bind(snapshot.right.mu)
            .bind(snapshot.right.sigma_sq)
            .bind(comparison_id)
            .execute(&mut **tx)
            .await?
        }
        ComparisonWrite::Revise {
            comparison_id,
            winner_id,
            judged_at,
            revision_count,
        } => {
            sqlx::query(
                "UPDATE comparisons SET winner_id = ?, judged_at = ?, revision_count = ? \
                 WHERE id = ? AND winner_id IS NOT NULL",
            )
            .bind(winner_id)
            .bind(judged_at)
            .bind(*revision_count)
            .bind(comparison_id)
            .execute(&mut **tx)
            .await?
        }
        ComparisonWrite::Resnapshot {
            comparison_id,
            snapshot,
        } => {
            sqlx::query(
                r#"
                UPDATE comparisons
                SET prev_left_mu = ?, prev_left_sigma_sq = ?,
                    prev_right_mu = ?, prev_right_sigma_sq = ?
                WHERE id = ? AND winner_id IS NOT NULL
                "#,
            )
            .bind(snapshot.left.mu)
            .bind(snapshot.left.sigma_sq)
            .bind(snapshot.right.mu)
            .bind(snapshot.right.sigma_sq)
            .bind(comparison_id)
            .execute(&mut **tx)
            .await?
        }
    };
    Ok(result.rows_affected())
}

fn item_from_row(row: &SqliteRow) -> std::result::Result<StoredItem, sqlx::Error> {
    Ok(StoredItem {
        item: Item {
            id: row.try_get("id")?,
            mu: row.try_get("mu")?,
            sigma_sq: row.try_get("sigma_sq")?,
            comparison_count: row.try_get("comparison_count")?,
        },
        version: row.try_get("version")?,
    })
}

fn comparison_from_row(row: &SqliteRow) -> std::result::Result<Comparison, sqlx::Error> {
    let prev: (Option<f64>, Option<f64>, Option<f64>, Option<f64>) = (
        row.try_get("prev_left_mu")?,
        row.try_get("prev_left_sigma_sq")?,
        row.try_get("prev_right_mu")?,
        row.try_get("prev_right_sigma_sq")?,
    );
    let snapshot = match prev {
        (Some(lm), Some(ls), Some(rm), Some(rs)) => Some(Snapshot {
            left: Rating::new(lm, ls),
            right: Rating::new(rm, rs),
        }),
        _ => None,
    };
    let judged_at: Option<DateTime<Utc>> = row.try_get("judged_at")?;

    Ok(Comparison {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        position: row.try_get("position")?,
        left_item_id: row.try_get("left_item_id")?,
        right_item_id: row.try_get("right_item_id")?,
        winner_id: row.try_get("winner_id")?,
        judged_at,
        snapshot,
        judged_seq: row.try_get("judged_seq")?,
        revision_count: row.try_get("revision_count")?,
    })
}

/// SQLite reports writer contention as "database is locked" (SQLITE_BUSY).
fn is_lock_error(err: &sqlx::Error) -> bool {
    let msg = err.to_string();
    msg.contains("database is locked") || msg.contains("database table is locked")
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_foreign_key_violation())
}

#[async_trait]
impl RatingStore for SqliteStore {
    async fn insert_item(&self, item: &Item) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO items (id, mu, sigma_sq, comparison_count, version) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&item.id)
        .bind(item.mu)
        .bind(item.sigma_sq)
        .bind(item.comparison_count)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::DuplicateItem(item.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_items(&self) -> Result<Vec<StoredItem>> {
        let rows = sqlx::query(
            "SELECT id, mu, sigma_sq, comparison_count, version FROM items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| item_from_row(row).map_err(Error::from))
            .collect()
    }

    async fn load_item(&self, id: &str) -> Result<Option<StoredItem>> {
        let row = sqlx::query(
            "SELECT id, mu, sigma_sq, comparison_count, version FROM items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(item_from_row).transpose()?)
    }

    async fn load_comparison(&self, id: &str) -> Result<Option<Comparison>> {
        let sql = format!("SELECT {COMPARISON_COLUMNS} FROM comparisons WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(comparison_from_row).transpose()?)
    }

    async fn session_comparisons(&self, session_id: &str) -> Result<Vec<Comparison>> {
        let sql = format!(
            "SELECT {COMPARISON_COLUMNS} FROM comparisons WHERE session_id = ? ORDER BY position"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| comparison_from_row(row).map_err(Error::from))
            .collect()
    }

    async fn insert_comparison(&self, comparison: &Comparison) -> Result<CommitOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO comparisons (id, session_id, position, left_item_id, right_item_id, revision_count)
            VALUES (?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&comparison.id)
        .bind(&comparison.session_id)
        .bind(comparison.position)
        .bind(&comparison.left_item_id)
        .bind(&comparison.right_item_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(CommitOutcome::Committed),
            Err(e) if is_unique_violation(&e) || is_lock_error(&e) => Ok(CommitOutcome::Conflict),
            Err(e) if is_foreign_key_violation(&e) => Err(EngineError::UnknownItem(format!(
                "{} or {}",
                comparison.left_item_id, comparison.right_item_id
            ))
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn judged_after(&self, seq: i64) -> Result<Vec<Comparison>> {
        let sql = format!(
            "SELECT {COMPARISON_COLUMNS} FROM comparisons WHERE judged_seq > ? ORDER BY judged_seq"
        );
        let rows = sqlx::query(&sql).bind(seq).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| comparison_from_row(row).map_err(Error::from))
            .collect()
    }

    async fn commit(&self, commit: &JudgmentCommit) -> Result<CommitOutcome> {
        match self.try_commit(commit).await {
            Err(Error::Database(e)) if is_lock_error(&e) => {
                debug!("Commit hit a locked database, reporting conflict");
                Ok(CommitOutcome::Conflict)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ItemWrite;
    use pairjudge_core::Pair;

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("ratings.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ratings.db");

        let first = SqliteStore::open(&path).await.unwrap();
        first
            .insert_item(&Item::new("a", Rating::new(1500.0, 350_000.0)))
            .await
            .unwrap();
        drop(first);

        let second = SqliteStore::open(&path).await.unwrap();
        assert_eq!(second.load_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_float_round_trip_is_exact() {
        let (_dir, store) = temp_store().await;
        let rating = Rating::new(1532.000_000_000_2, 297_499.999_999_999_94);
        store.insert_item(&Item::new("x", rating)).await.unwrap();

        let loaded = store.load_item("x").await.unwrap().unwrap();
        assert_eq!(loaded.item.rating(), rating);
        assert_eq!(loaded.version, 0);
    }

    #[tokio::test]
    async fn test_conflicting_commit_rolls_back() {
        let (_dir, store) = temp_store().await;
        for id in ["a", "b"] {
            store
                .insert_item(&Item::new(id, Rating::new(1500.0, 350_000.0)))
                .await
                .unwrap();
        }
        let comparison = Comparison::pending("c1", "s", 0, Pair::new("a", "b"));
        store.insert_comparison(&comparison).await.unwrap();

        let a = store.load_item("a").await.unwrap().unwrap();
        let mut b = store.load_item("b").await.unwrap().unwrap();
        b.version = 41; // stale

        let commit = JudgmentCommit {
            items: vec![
                ItemWrite::over(&a, Rating::new(1532.0, 297_500.0), 1),
                ItemWrite::over(&b, Rating::new(1468.0, 297_500.0), 1),
            ],
            comparisons: vec![ComparisonWrite::Judge {
                comparison_id: "c1".into(),
                winner_id: "a".into(),
                judged_at: Utc::now(),
                snapshot: Snapshot {
                    left: a.item.rating(),
                    right: b.item.rating(),
                },
            }],
        };
        assert_eq!(store.commit(&commit).await.unwrap(), CommitOutcome::Conflict);

        // The first item update was rolled back with the rest.
        let a_after = store.load_item("a").await.unwrap().unwrap();
        assert_eq!(a_after, a);
        let c_after = store.load_comparison("c1").await.unwrap().unwrap();
        assert_eq!(c_after.winner_id, None);
    }

    #[tokio::test]
    async fn test_judged_seq_increments() {
        let (_dir, store) = temp_store().await;
        for id in ["a", "b", "c"] {
            store
                .insert_item(&Item::new(id, Rating::new(1500.0, 350_000.0)))
                .await
                .unwrap();
        }
        for (i, (l, r)) in [("a", "b"), ("b", "c")].into_iter().enumerate() {
            let id = format!("c{i}");
            store
                .insert_comparison(&Comparison::pending(&id, "s", i as u32, Pair::new(l, r)))
                .await
                .unwrap();
            let commit = JudgmentCommit {
                items: vec![],
                comparisons: vec![ComparisonWrite::Judge {
                    comparison_id: id,
                    winner_id: l.into(),
                    judged_at: Utc::now(),
                    snapshot: Snapshot {
                        left: Rating::new(1500.0, 1.0),
                        right: Rating::new(1500.0, 1.0),
                    },
                }],
            };
            assert_eq!(store.commit(&commit).await.unwrap(), CommitOutcome::Committed);
        }

        let judged = store.judged_after(0).await.unwrap();
        let seqs: Vec<Option<i64>> = judged.iter().map(|c| c.judged_seq).collect();
        assert_eq!(seqs, vec![Some(1), Some(2)]);
        assert!(judged[0].judged_at.is_some());
        assert_eq!(store.judged_after(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_item_in_comparison() {
        let (_dir, store) = temp_store().await;
        store
            .insert_item(&Item::new("a", Rating::new(1500.0, 1.0)))
            .await
            .unwrap();
        let result = store
            .insert_comparison(&Comparison::pending("c1", "s", 0, Pair::new("a", "ghost")))
            .await;
        assert!(matches!(result, Err(Error::Engine(EngineError::UnknownItem(_)))));
    }
}
