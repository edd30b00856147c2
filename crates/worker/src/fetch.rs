//! Secondary killmail detail fetch.
//!
//! One bounded GET per kill: `{base}/killmails/{id}/{hash}/`, answered with
//! the ESI killmail document.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use killwatch_core::config::FetchConfig;
use killwatch_core::{EnrichmentDetail, EntityId, ItemLoss, KillId, Position};

#[derive(Error, Debug)]
pub enum FetchError {
    /// The source has no such killmail (404).
    #[error("killmail not found")]
    NotFound,

    #[error("malformed killmail detail: {0}")]
    Malformed(String),

    /// Timeout, 5xx, or a transport failure. Worth another attempt.
    #[error("transient fetch failure: {0}")]
    Transient(String),
}

impl FetchError {
    /// Permanent failures make the kill unfetchable immediately.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::NotFound | FetchError::Malformed(_))
    }
}

#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch(&self, kill_id: KillId, hash: &str) -> Result<EnrichmentDetail, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpDetailFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDetailFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
            &config.user_agent,
        )
    }

    pub fn url_for(&self, kill_id: KillId, hash: &str) -> String {
        format!("{}/killmails/{kill_id}/{hash}/", self.base_url)
    }
}

#[async_trait]
impl DetailFetcher for HttpDetailFetcher {
    async fn fetch(&self, kill_id: KillId, hash: &str) -> Result<EnrichmentDetail, FetchError> {
        let url = self.url_for(kill_id, hash);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::Transient(format!("detail endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::Malformed(format!("detail endpoint returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        let detail = parse_detail(&body)?;
        debug!(kill_id, attackers = detail.attacker_character_ids.len(), "fetched killmail detail");
        Ok(detail)
    }
}

// ── ESI document ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct EsiKillmail {
    victim: EsiVictim,
    #[serde(default)]
    attackers: Vec<EsiAttacker>,
}

#[derive(Deserialize)]
struct EsiVictim {
    #[serde(default)]
    character_id: Option<EntityId>,
    #[serde(default)]
    damage_taken: u64,
    #[serde(default)]
    items: Vec<EsiItem>,
    #[serde(default)]
    position: Option<Position>,
}

#[derive(Deserialize)]
struct EsiAttacker {
    #[serde(default)]
    character_id: Option<EntityId>,
}

#[derive(Deserialize)]
struct EsiItem {
    item_type_id: EntityId,
    #[serde(default)]
    quantity_destroyed: u64,
    #[serde(default)]
    quantity_dropped: u64,
    #[serde(default)]
    flag: i64,
}

/// Parse an ESI killmail document into the enrichment detail we keep.
pub fn parse_detail(body: &str) -> Result<EnrichmentDetail, FetchError> {
    let doc: EsiKillmail =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let mut attacker_character_ids: Vec<EntityId> =
        doc.attackers.iter().filter_map(|a| a.character_id).collect();
    attacker_character_ids.sort_unstable();
    attacker_character_ids.dedup();

    Ok(EnrichmentDetail {
        victim_character_id: doc.victim.character_id,
        attacker_character_ids,
        damage_taken: doc.victim.damage_taken,
        items: doc
            .victim
            .items
            .into_iter()
            .map(|i| ItemLoss {
                item_type_id: i.item_type_id,
                quantity_destroyed: i.quantity_destroyed,
                quantity_dropped: i.quantity_dropped,
                flag: i.flag,
            })
            .collect(),
        position: doc.victim.position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESI_SAMPLE: &str = r#"{
        "killmail_id": 123456789,
        "killmail_time": "2026-03-01T18:04:11Z",
        "solar_system_id": 30002187,
        "victim": {
            "character_id": 90000001,
            "corporation_id": 98000001,
            "damage_taken": 48211,
            "ship_type_id": 17738,
            "items": [
                {"item_type_id": 2048, "quantity_destroyed": 1, "flag": 27, "singleton": 0},
                {"item_type_id": 3170, "quantity_dropped": 2, "flag": 5, "singleton": 0}
            ],
            "position": {"x": 1.5, "y": -2.0, "z": 3.25}
        },
        "attackers": [
            {"character_id": 90000010, "corporation_id": 98000002, "final_blow": true, "damage_done": 30000},
            {"corporation_id": 1000125, "final_blow": false, "damage_done": 1000},
            {"character_id": 90000009, "corporation_id": 98000002, "final_blow": false, "damage_done": 17211},
            {"character_id": 90000010, "corporation_id": 98000002, "final_blow": false, "damage_done": 0}
        ]
    }"#;

    #[test]
    fn parses_esi_killmail() {
        let detail = parse_detail(ESI_SAMPLE).unwrap();
        assert_eq!(detail.victim_character_id, Some(90000001));
        assert_eq!(detail.attacker_character_ids, vec![90000009, 90000010]);
        assert_eq!(detail.damage_taken, 48211);
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.items[1].quantity_dropped, 2);
        assert_eq!(detail.position.map(|p| p.z), Some(3.25));
    }

    #[test]
    fn malformed_detail_is_permanent() {
        let err = parse_detail(r#"{"attackers": []}"#).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
        assert!(err.is_permanent());
        assert!(!FetchError::Transient("503".into()).is_permanent());
    }

    #[test]
    fn url_has_trailing_slash() {
        let fetcher =
            HttpDetailFetcher::new("https://esi.example/latest/", Duration::from_secs(5), "test").unwrap();
        assert_eq!(
            fetcher.url_for(42, "abc"),
            "https://esi.example/latest/killmails/42/abc/"
        );
    }
}
