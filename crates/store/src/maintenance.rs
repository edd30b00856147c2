//! Retention sweeps and storage statistics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use tracing::info;

use crate::error::Result;
use crate::{to_millis, EventStore};

/// Row counts and on-disk size, for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub kills: u64,
    pub enriched: u64,
    pub unfetchable: u64,
    pub active_claims: u64,
    pub processed_markers: u64,
    pub checkpoints: u64,
    pub size_bytes: u64,
}

impl EventStore {
    /// Delete kills older than `cutoff`. Enrichment and attempt rows cascade.
    pub async fn expunge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM kills WHERE kill_time < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "expunged old kills");
        }
        Ok(deleted)
    }

    /// Purge processed markers written before `older_than`.
    pub async fn expunge_processed_kills(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM processed_kills WHERE processed_at < ?")
            .bind(to_millis(older_than))
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted > 0 {
            info!(deleted, "expunged processed markers");
        }
        Ok(deleted)
    }

    /// Drop claims older than `threshold`; their holders are presumed dead.
    pub async fn expunge_stale_claims(&self, threshold: Duration) -> Result<u64> {
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let deleted = sqlx::query("DELETE FROM enrichment_claims WHERE claimed_at < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted > 0 {
            info!(deleted, "expunged stale enrichment claims");
        }
        Ok(deleted)
    }

    pub async fn get_stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM kills) AS kills,
                (SELECT COUNT(*) FROM enrichments WHERE status = 'enriched') AS enriched,
                (SELECT COUNT(*) FROM enrichments WHERE status = 'unfetchable') AS unfetchable,
                (SELECT COUNT(*) FROM enrichment_claims) AS active_claims,
                (SELECT COUNT(*) FROM processed_kills) AS processed_markers,
                (SELECT COUNT(*) FROM worker_checkpoints) AS checkpoints",
        )
        .fetch_one(&self.pool)
        .await?;

        let size: i64 = sqlx::query_scalar(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |name: &str| -> Result<u64> {
            let v: i64 = row.try_get(name)?;
            Ok(v.max(0) as u64)
        };

        Ok(StoreStats {
            kills: count("kills")?,
            enriched: count("enriched")?,
            unfetchable: count("unfetchable")?,
            active_claims: count("active_claims")?,
            processed_markers: count("processed_markers")?,
            checkpoints: count("checkpoints")?,
            size_bytes: size.max(0) as u64,
        })
    }
}
