//! Durable event store for killmails and worker progress.
//!
//! This crate provides:
//! - Idempotent killmail ingestion (single and batch)
//! - Keyset-paginated queries ordered by `(kill_time DESC, kill_id DESC)`
//! - Enrichment claims as a single atomic conditional upsert
//! - Write-once enrichment records and fetch-attempt counters
//! - Per-worker processed ledger and checkpoints
//! - Independent retention sweeps and storage statistics
//!
//! Backed by SQLite through `sqlx`. Every mutating call is one atomic unit;
//! no transaction spans claim + enrichment + processed marker.

mod enrichment;
mod error;
mod kills;
mod ledger;
mod maintenance;
mod query;
mod schema;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub use error::{Result, StoreError};
pub use ledger::WorkerCheckpoint;
pub use maintenance::StoreStats;
pub use query::{KillCursor, KillFilter, KillPage};

/// Default age after which an enrichment claim is considered abandoned.
pub const DEFAULT_CLAIM_TTL: Duration = Duration::from_secs(120);

/// Handle to the killmail database. Cheap to clone; all clones share one pool.
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
    claim_ttl: chrono::Duration,
}

impl EventStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Corrupt(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.bootstrap().await?;
        info!(path = %path.display(), "event store opened");
        Ok(store)
    }

    /// Open a private in-memory database. Used by tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // A single long-lived connection: the database vanishes when it closes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.bootstrap().await?;
        Ok(store)
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            claim_ttl: chrono::Duration::from_std(DEFAULT_CLAIM_TTL)
                .unwrap_or_else(|_| chrono::Duration::seconds(120)),
        }
    }

    /// Override the claim staleness threshold.
    pub fn with_claim_ttl(mut self, ttl: Duration) -> Self {
        if let Ok(ttl) = chrono::Duration::from_std(ttl) {
            self.claim_ttl = ttl;
        }
        self
    }

    pub fn claim_ttl(&self) -> chrono::Duration {
        self.claim_ttl
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn bootstrap(&self) -> Result<()> {
        sqlx::raw_sql(schema::SCHEMA).execute(&self.pool).await?;
        // Fails on a file that is not a readable SQLite database.
        sqlx::query("SELECT COUNT(*) FROM kills")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}
