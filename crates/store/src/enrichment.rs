//! Enrichment claims, write-once enrichment records, and fetch-attempt counters.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use killwatch_core::{EnrichmentDetail, EnrichmentState, KillId};

use crate::error::{Result, StoreError};
use crate::{to_millis, EventStore};

impl EventStore {
    /// Try to take the enrichment lease for `kill_id`.
    ///
    /// Succeeds iff no claim exists, the existing claim is older than the claim
    /// TTL, or the existing claim already belongs to `worker_id`. This is one
    /// conditional upsert; the row is only rewritten when the `WHERE` holds.
    pub async fn try_claim_enrichment(&self, kill_id: KillId, worker_id: &str) -> Result<bool> {
        self.try_claim_enrichment_at(kill_id, worker_id, Utc::now()).await
    }

    pub async fn try_claim_enrichment_at(
        &self,
        kill_id: KillId,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let stale_before = to_millis(
            now.checked_sub_signed(self.claim_ttl)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        );
        let affected = sqlx::query(
            "INSERT INTO enrichment_claims (kill_id, worker_id, claimed_at) VALUES (?, ?, ?)
             ON CONFLICT (kill_id) DO UPDATE
                SET worker_id = excluded.worker_id, claimed_at = excluded.claimed_at
              WHERE enrichment_claims.worker_id = excluded.worker_id
                 OR enrichment_claims.claimed_at <= ?",
        )
        .bind(kill_id)
        .bind(worker_id)
        .bind(to_millis(now))
        .bind(stale_before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let won = affected == 1;
        debug!(kill_id, worker = worker_id, won, "enrichment claim attempt");
        Ok(won)
    }

    /// Drop the claim if `worker_id` holds it. Returns whether a claim was removed.
    pub async fn release_claim(&self, kill_id: KillId, worker_id: &str) -> Result<bool> {
        let affected = sqlx::query(
            "DELETE FROM enrichment_claims WHERE kill_id = ? AND worker_id = ?",
        )
        .bind(kill_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected == 1)
    }

    /// Current claim holder, if any (expired claims included).
    pub async fn claim_holder(&self, kill_id: KillId) -> Result<Option<String>> {
        let holder = sqlx::query_scalar("SELECT worker_id FROM enrichment_claims WHERE kill_id = ?")
            .bind(kill_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(holder)
    }

    /// Record fetched detail. Write-once: returns `false` when the kill already
    /// has an enrichment record (enriched or unfetchable).
    pub async fn store_enrichment(&self, kill_id: KillId, detail: &EnrichmentDetail) -> Result<bool> {
        let affected = sqlx::query(
            "INSERT INTO enrichments (kill_id, status, detail, reason, recorded_at)
             VALUES (?, 'enriched', ?, NULL, ?)
             ON CONFLICT (kill_id) DO NOTHING",
        )
        .bind(kill_id)
        .bind(serde_json::to_string(detail)?)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected == 1)
    }

    /// Record the terminal "unfetchable" marker. Write-once like [`Self::store_enrichment`].
    pub async fn mark_unfetchable(&self, kill_id: KillId, reason: &str) -> Result<bool> {
        let affected = sqlx::query(
            "INSERT INTO enrichments (kill_id, status, detail, reason, recorded_at)
             VALUES (?, 'unfetchable', NULL, ?, ?)
             ON CONFLICT (kill_id) DO NOTHING",
        )
        .bind(kill_id)
        .bind(reason)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected == 1)
    }

    pub async fn enrichment_state(&self, kill_id: KillId) -> Result<EnrichmentState> {
        let row = sqlx::query("SELECT status, detail, reason FROM enrichments WHERE kill_id = ?")
            .bind(kill_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(EnrichmentState::Pending);
        };

        let status: String = row.try_get("status")?;
        match status.as_str() {
            "enriched" => {
                let raw: Option<String> = row.try_get("detail")?;
                let raw = raw.ok_or_else(|| {
                    StoreError::Corrupt(format!("kill {kill_id} enriched without detail"))
                })?;
                let detail = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Corrupt(format!("kill {kill_id} detail: {e}")))?;
                Ok(EnrichmentState::Enriched(detail))
            }
            "unfetchable" => {
                let reason: Option<String> = row.try_get("reason")?;
                Ok(EnrichmentState::Unfetchable {
                    reason: reason.unwrap_or_default(),
                })
            }
            other => Err(StoreError::Corrupt(format!(
                "kill {kill_id} has unknown enrichment status '{other}'"
            ))),
        }
    }

    /// Count one transient fetch failure and return the new total.
    pub async fn record_fetch_failure(&self, kill_id: KillId) -> Result<u32> {
        let attempts: i64 = sqlx::query_scalar(
            "INSERT INTO fetch_attempts (kill_id, attempts, last_attempt_at) VALUES (?, 1, ?)
             ON CONFLICT (kill_id) DO UPDATE
                SET attempts = fetch_attempts.attempts + 1,
                    last_attempt_at = excluded.last_attempt_at
             RETURNING attempts",
        )
        .bind(kill_id)
        .bind(to_millis(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(attempts).unwrap_or(u32::MAX))
    }

    pub async fn fetch_attempts(&self, kill_id: KillId) -> Result<u32> {
        let attempts: Option<i64> =
            sqlx::query_scalar("SELECT attempts FROM fetch_attempts WHERE kill_id = ?")
                .bind(kill_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(attempts.map(|a| u32::try_from(a).unwrap_or(u32::MAX)).unwrap_or(0))
    }
}
