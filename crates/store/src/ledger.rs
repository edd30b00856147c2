//! Per-worker processed ledger and checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use killwatch_core::KillId;

use crate::error::Result;
use crate::{from_millis, to_millis, EventStore};

/// Progress of one worker, persisted after each poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCheckpoint {
    pub worker_id: String,
    /// Newest kill time this worker has fully handled.
    pub last_processed_time: Option<DateTime<Utc>>,
    pub last_poll_time: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl WorkerCheckpoint {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            last_processed_time: None,
            last_poll_time: None,
            consecutive_failures: 0,
        }
    }
}

impl EventStore {
    /// Record that `worker_id` finished with `kill_id`. Re-marking is a no-op.
    pub async fn mark_processed(&self, worker_id: &str, kill_id: KillId) -> Result<()> {
        sqlx::query(
            "INSERT INTO processed_kills (worker_id, kill_id, processed_at) VALUES (?, ?, ?)
             ON CONFLICT (worker_id, kill_id) DO NOTHING",
        )
        .bind(worker_id)
        .bind(kill_id)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_processed(&self, worker_id: &str, kill_id: KillId) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM processed_kills WHERE worker_id = ? AND kill_id = ?",
        )
        .bind(worker_id)
        .bind(kill_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Load a worker's checkpoint, or a fresh one if it has never run.
    pub async fn load_checkpoint(&self, worker_id: &str) -> Result<WorkerCheckpoint> {
        let row = sqlx::query(
            "SELECT last_processed_time, last_poll_time, consecutive_failures
             FROM worker_checkpoints WHERE worker_id = ?",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(WorkerCheckpoint::new(worker_id));
        };

        let processed: Option<i64> = row.try_get("last_processed_time")?;
        let polled: Option<i64> = row.try_get("last_poll_time")?;
        let failures: i64 = row.try_get("consecutive_failures")?;
        Ok(WorkerCheckpoint {
            worker_id: worker_id.to_string(),
            last_processed_time: processed.map(from_millis).transpose()?,
            last_poll_time: polled.map(from_millis).transpose()?,
            consecutive_failures: u32::try_from(failures).unwrap_or(0),
        })
    }

    pub async fn save_checkpoint(&self, checkpoint: &WorkerCheckpoint) -> Result<()> {
        sqlx::query(
            "INSERT INTO worker_checkpoints
                (worker_id, last_processed_time, last_poll_time, consecutive_failures)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (worker_id) DO UPDATE SET
                last_processed_time = excluded.last_processed_time,
                last_poll_time = excluded.last_poll_time,
                consecutive_failures = excluded.consecutive_failures",
        )
        .bind(&checkpoint.worker_id)
        .bind(checkpoint.last_processed_time.map(to_millis))
        .bind(checkpoint.last_poll_time.map(to_millis))
        .bind(i64::from(checkpoint.consecutive_failures))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
