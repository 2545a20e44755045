// src/core/storage/mod.rs

//! The storage engine: a single embedded SQLite store with an FTS5
//! full-text index, reached through a pooled `sqlx::SqlitePool`. Writes are
//! effectively single-writer as observed externally, since SQLite
//! serializes them at the connection-pool level.

pub mod alerts;
pub mod messages;
pub mod schema;
pub mod timeseries;

use crate::config::DecoderKind;
use crate::core::errors::{AcarshubError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Handle to the storage engine. Cheap to clone (wraps a pool).
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
    next_uid: std::sync::Arc<AtomicU64>,
}

impl Storage {
    /// Opens (creating if absent) the SQLite database at `path` and runs
    /// every migration.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| AcarshubError::Storage(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let storage = Self {
            pool,
            next_uid: std::sync::Arc::new(AtomicU64::new(1)),
        };
        storage.migrate().await?;
        storage.recover_next_uid().await?;
        Ok(storage)
    }

    /// Opens an in-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self {
            pool,
            next_uid: std::sync::Arc::new(AtomicU64::new(1)),
        };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(schema::MESSAGES_TABLE).execute(&self.pool).await?;
        sqlx::query(schema::MESSAGES_FTS_TABLE).execute(&self.pool).await?;
        sqlx::query(schema::ALERT_TABLES).execute(&self.pool).await?;
        sqlx::query(schema::COUNT_TABLES).execute(&self.pool).await?;
        sqlx::query(schema::TIMESERIES_TABLE).execute(&self.pool).await?;
        sqlx::query(schema::STATION_IDS_TABLE).execute(&self.pool).await?;
        for kind in DecoderKind::all() {
            sqlx::query(&schema::per_kind_tables(kind)).execute(&self.pool).await?;
        }
        info!("storage: schema migrations applied");
        Ok(())
    }

    /// Every `uid` produced is unique for the process's lifetime and never
    /// re-observed. Restarting against an existing database resumes from
    /// the highest uid already stored.
    async fn recover_next_uid(&self) -> Result<()> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(uid) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        if let Some(max) = max {
            self.next_uid.store(max as u64 + 1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub(crate) fn next_uid(&self) -> u64 {
        self.next_uid.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// `optimizeRegular`: updates the query-planner statistics. Best-effort.
    pub async fn optimize_regular(&self) {
        if let Err(e) = sqlx::query("PRAGMA optimize").execute(&self.pool).await {
            tracing::error!("optimize_regular failed: {e}");
        }
    }

    /// `optimizeMerge`: consolidates the FTS5 index's b-tree segments.
    pub async fn optimize_merge(&self, level: i64) {
        let result = sqlx::query("INSERT INTO messages_fts(messages_fts) VALUES (?)")
            .bind(format!("merge={level}"))
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            tracing::error!("optimize_merge failed: {e}");
        }
    }
}
