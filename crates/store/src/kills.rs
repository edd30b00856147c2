//! Killmail ingestion and read paths.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, warn};

use killwatch_core::{AttackerSummary, EntityId, KillId, Killmail, SystemId};

use crate::error::{Result, StoreError};
use crate::query::{KillCursor, KillFilter, KillPage};
use crate::{from_millis, to_millis, EventStore};

const INSERT_KILL: &str = "INSERT INTO kills (
        kill_id, kill_time, solar_system_id, victim_ship_type_id, victim_corporation_id,
        victim_alliance_id, attacker_count, attacker_corporations, attacker_alliances,
        attacker_ships, final_blow_ship_type_id, total_value, is_pod_kill, hash, ingested_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (kill_id) DO NOTHING";

impl EventStore {
    /// Insert one killmail. Returns `false` when the kill id already exists.
    pub async fn insert_kill(&self, kill: &Killmail) -> Result<bool> {
        kill.validate()?;
        let inserted = bind_kill(sqlx::query(INSERT_KILL), kill, Utc::now())?
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(inserted == 1)
    }

    /// Insert many killmails in one transaction. Duplicates and invalid rows are
    /// skipped; returns the number of rows actually inserted.
    pub async fn insert_kills_batch(&self, kills: &[Killmail]) -> Result<u64> {
        if kills.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for kill in kills {
            if let Err(e) = kill.validate() {
                warn!(kill_id = kill.kill_id, error = %e, "skipping invalid killmail in batch");
                continue;
            }
            inserted += bind_kill(sqlx::query(INSERT_KILL), kill, now)?
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        debug!(offered = kills.len(), inserted, "batch insert complete");
        Ok(inserted)
    }

    pub async fn get_kill(&self, kill_id: KillId) -> Result<Option<Killmail>> {
        let row = sqlx::query("SELECT * FROM kills WHERE kill_id = ?")
            .bind(kill_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(kill_from_row).transpose()
    }

    /// Page through kills newest first. Pass the previous page's `next` cursor to
    /// continue; ordering on `(kill_time, kill_id)` keeps pages gap-free while
    /// rows are being inserted.
    pub async fn query_kills(
        &self,
        filter: &KillFilter,
        cursor: Option<KillCursor>,
        limit: u32,
    ) -> Result<KillPage> {
        if limit == 0 {
            return Ok(KillPage {
                kills: Vec::new(),
                next: None,
            });
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM kills WHERE 1 = 1");
        if !filter.systems.is_empty() {
            qb.push(" AND solar_system_id IN (");
            let mut sep = qb.separated(", ");
            for system in &filter.systems {
                sep.push_bind(*system);
            }
            sep.push_unseparated(")");
        }
        if let Some(since) = filter.since {
            qb.push(" AND kill_time >= ").push_bind(to_millis(since));
        }
        if let Some(until) = filter.until {
            qb.push(" AND kill_time < ").push_bind(to_millis(until));
        }
        if let Some(min_value) = filter.min_value {
            qb.push(" AND total_value >= ").push_bind(min_value);
        }
        if let Some(c) = cursor {
            let t = to_millis(c.kill_time);
            qb.push(" AND (kill_time < ")
                .push_bind(t)
                .push(" OR (kill_time = ")
                .push_bind(t)
                .push(" AND kill_id < ")
                .push_bind(c.kill_id)
                .push("))");
        }
        qb.push(" ORDER BY kill_time DESC, kill_id DESC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = qb.build().fetch_all(&self.pool).await?;
        let kills = rows.iter().map(kill_from_row).collect::<Result<Vec<_>>>()?;
        let next = if kills.len() == limit as usize {
            kills.last().map(KillCursor::after)
        } else {
            None
        };
        Ok(KillPage { kills, next })
    }

    /// Kills in one system within `[since, until)`, oldest first.
    pub async fn kills_in_system_window(
        &self,
        system_id: SystemId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Killmail>> {
        let rows = sqlx::query(
            "SELECT * FROM kills
             WHERE solar_system_id = ? AND kill_time >= ? AND kill_time < ?
             ORDER BY kill_time ASC, kill_id ASC",
        )
        .bind(system_id)
        .bind(to_millis(since))
        .bind(to_millis(until))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(kill_from_row).collect()
    }

    /// Number of kills in a system within `[since, until)`.
    pub async fn count_kills_in_system(
        &self,
        system_id: SystemId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM kills
             WHERE solar_system_id = ? AND kill_time >= ? AND kill_time < ?",
        )
        .bind(system_id)
        .bind(to_millis(since))
        .bind(to_millis(until))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    /// Oldest-first page of kills at or after `since` that `worker_id` has not
    /// yet marked processed. The ledger anti-join happens in the same query.
    pub async fn poll_unprocessed(
        &self,
        worker_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Killmail>> {
        self.poll_unprocessed_excluding(worker_id, since, limit, &[]).await
    }

    /// [`poll_unprocessed`](Self::poll_unprocessed) that also skips `exclude`,
    /// so kills a worker is still holding in memory do not take page slots.
    pub async fn poll_unprocessed_excluding(
        &self,
        worker_id: &str,
        since: DateTime<Utc>,
        limit: u32,
        exclude: &[KillId],
    ) -> Result<Vec<Killmail>> {
        let rows = sqlx::query(
            "SELECT k.* FROM kills k
             WHERE k.kill_time >= ?
               AND NOT EXISTS (
                   SELECT 1 FROM processed_kills p
                   WHERE p.worker_id = ? AND p.kill_id = k.kill_id
               )
               AND k.kill_id NOT IN (SELECT value FROM json_each(?))
             ORDER BY k.kill_time ASC, k.kill_id ASC
             LIMIT ?",
        )
        .bind(to_millis(since))
        .bind(worker_id)
        .bind(serde_json::to_string(exclude)?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(kill_from_row).collect()
    }
}

fn bind_kill<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    kill: &Killmail,
    ingested_at: DateTime<Utc>,
) -> Result<sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>> {
    Ok(query
        .bind(kill.kill_id)
        .bind(to_millis(kill.kill_time))
        .bind(kill.solar_system_id)
        .bind(kill.victim_ship_type_id)
        .bind(kill.victim_corporation_id)
        .bind(kill.victim_alliance_id)
        .bind(i64::from(kill.attackers.count))
        .bind(serde_json::to_string(&kill.attackers.corporation_ids)?)
        .bind(serde_json::to_string(&kill.attackers.alliance_ids)?)
        .bind(serde_json::to_string(&kill.attackers.ship_type_ids)?)
        .bind(kill.final_blow_ship_type_id)
        .bind(kill.total_value)
        .bind(kill.is_pod_kill)
        .bind(kill.hash.clone())
        .bind(to_millis(ingested_at)))
}

fn id_set(row: &SqliteRow, column: &str) -> Result<BTreeSet<EntityId>> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

pub(crate) fn kill_from_row(row: &SqliteRow) -> Result<Killmail> {
    let attacker_count: i64 = row.try_get("attacker_count")?;
    Ok(Killmail {
        kill_id: row.try_get("kill_id")?,
        kill_time: from_millis(row.try_get("kill_time")?)?,
        solar_system_id: row.try_get("solar_system_id")?,
        victim_ship_type_id: row.try_get("victim_ship_type_id")?,
        victim_corporation_id: row.try_get("victim_corporation_id")?,
        victim_alliance_id: row.try_get("victim_alliance_id")?,
        attackers: AttackerSummary {
            count: u32::try_from(attacker_count)
                .map_err(|_| StoreError::Corrupt(format!("attacker_count {attacker_count}")))?,
            corporation_ids: id_set(row, "attacker_corporations")?,
            alliance_ids: id_set(row, "attacker_alliances")?,
            ship_type_ids: id_set(row, "attacker_ships")?,
        },
        final_blow_ship_type_id: row.try_get("final_blow_ship_type_id")?,
        total_value: row.try_get("total_value")?,
        is_pod_kill: row.try_get("is_pod_kill")?,
        hash: row.try_get("hash")?,
    })
}
