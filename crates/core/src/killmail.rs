use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KillwatchError;

/// Unique killmail identifier assigned by the game server.
pub type KillId = i64;

/// Solar system identifier.
pub type SystemId = i64;

/// Corporation, alliance, character or type identifier.
pub type EntityId = i64;

/// NPC corporations occupy a fixed id range in the game's id space.
const NPC_CORPORATION_RANGE: std::ops::RangeInclusive<EntityId> = 1_000_000..=1_999_999;

/// Returns true when the corporation id belongs to an NPC corporation.
pub fn is_npc_corporation(corporation_id: EntityId) -> bool {
    NPC_CORPORATION_RANGE.contains(&corporation_id)
}

/// Summary of the attacking side, small enough to ride along with every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttackerSummary {
    /// Number of attackers on the killmail (including NPCs).
    pub count: u32,
    #[serde(default)]
    pub corporation_ids: BTreeSet<EntityId>,
    #[serde(default)]
    pub alliance_ids: BTreeSet<EntityId>,
    #[serde(default)]
    pub ship_type_ids: BTreeSet<EntityId>,
}

impl AttackerSummary {
    /// True when every known attacker corporation is an NPC corporation.
    pub fn is_npc_only(&self) -> bool {
        !self.corporation_ids.is_empty()
            && self.corporation_ids.iter().all(|c| is_npc_corporation(*c))
    }
}

/// An immutable killmail row as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Killmail {
    pub kill_id: KillId,
    pub kill_time: DateTime<Utc>,
    pub solar_system_id: SystemId,
    pub victim_ship_type_id: EntityId,
    #[serde(default)]
    pub victim_corporation_id: Option<EntityId>,
    #[serde(default)]
    pub victim_alliance_id: Option<EntityId>,
    #[serde(default)]
    pub attackers: AttackerSummary,
    #[serde(default)]
    pub final_blow_ship_type_id: Option<EntityId>,
    #[serde(default)]
    pub total_value: f64,
    #[serde(default)]
    pub is_pod_kill: bool,
    /// Source hash required to fetch the full killmail.
    pub hash: String,
}

impl Killmail {
    /// Reject rows that would poison downstream scoring.
    pub fn validate(&self) -> Result<(), KillwatchError> {
        if self.hash.trim().is_empty() {
            return Err(KillwatchError::InvalidKillmail {
                kill_id: self.kill_id,
                reason: "empty hash".to_string(),
            });
        }
        if !self.total_value.is_finite() || self.total_value < 0.0 {
            return Err(KillwatchError::InvalidKillmail {
                kill_id: self.kill_id,
                reason: format!("invalid total value {}", self.total_value),
            });
        }
        Ok(())
    }

    /// True when either side of the kill involves the given corporation or alliance.
    pub fn involves(&self, entity_id: EntityId) -> bool {
        self.victim_corporation_id == Some(entity_id)
            || self.victim_alliance_id == Some(entity_id)
            || self.attackers.corporation_ids.contains(&entity_id)
            || self.attackers.alliance_ids.contains(&entity_id)
    }
}

/// A single item dropped or destroyed with the victim's ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLoss {
    pub item_type_id: EntityId,
    #[serde(default)]
    pub quantity_destroyed: u64,
    #[serde(default)]
    pub quantity_dropped: u64,
    #[serde(default)]
    pub flag: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Per-kill detail obtainable only through the secondary fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentDetail {
    #[serde(default)]
    pub victim_character_id: Option<EntityId>,
    #[serde(default)]
    pub attacker_character_ids: Vec<EntityId>,
    #[serde(default)]
    pub damage_taken: u64,
    #[serde(default)]
    pub items: Vec<ItemLoss>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl EnrichmentDetail {
    /// True when the character was the victim or any attacker.
    pub fn involves_character(&self, character_id: EntityId) -> bool {
        self.victim_character_id == Some(character_id)
            || self.attacker_character_ids.contains(&character_id)
    }
}

/// Where a kill stands with respect to enrichment. Exactly one state at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentState {
    Pending,
    Enriched(EnrichmentDetail),
    Unfetchable { reason: String },
}

impl EnrichmentState {
    pub fn detail(&self) -> Option<&EnrichmentDetail> {
        match self {
            EnrichmentState::Enriched(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EnrichmentState::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Killmail {
        Killmail {
            kill_id: 1,
            kill_time: Utc::now(),
            solar_system_id: 30002187,
            victim_ship_type_id: 587,
            victim_corporation_id: Some(98000001),
            victim_alliance_id: None,
            attackers: AttackerSummary {
                count: 3,
                corporation_ids: BTreeSet::from([98000002]),
                alliance_ids: BTreeSet::from([99000001]),
                ship_type_ids: BTreeSet::from([621]),
            },
            final_blow_ship_type_id: Some(621),
            total_value: 12_500_000.0,
            is_pod_kill: false,
            hash: "abc123".to_string(),
        }
    }

    #[test]
    fn npc_corporation_range() {
        assert!(is_npc_corporation(1000125));
        assert!(!is_npc_corporation(98000001));
    }

    #[test]
    fn npc_only_requires_known_corporations() {
        let mut summary = AttackerSummary::default();
        assert!(!summary.is_npc_only());
        summary.corporation_ids.insert(1000125);
        assert!(summary.is_npc_only());
        summary.corporation_ids.insert(98000002);
        assert!(!summary.is_npc_only());
    }

    #[test]
    fn validate_rejects_empty_hash_and_bad_value() {
        let mut km = sample();
        assert!(km.validate().is_ok());
        km.hash = " ".to_string();
        assert!(km.validate().is_err());
        km.hash = "abc".to_string();
        km.total_value = f64::NAN;
        assert!(km.validate().is_err());
    }

    #[test]
    fn involves_checks_both_sides() {
        let km = sample();
        assert!(km.involves(98000001));
        assert!(km.involves(99000001));
        assert!(!km.involves(42));
    }

    #[test]
    fn killmail_deserializes_with_defaults() {
        let json = r#"{
            "kill_id": 7,
            "kill_time": "2026-01-01T12:00:00Z",
            "solar_system_id": 30000142,
            "victim_ship_type_id": 670,
            "hash": "deadbeef"
        }"#;
        let km: Killmail = serde_json::from_str(json).unwrap();
        assert_eq!(km.attackers.count, 0);
        assert!(!km.is_pod_kill);
        assert_eq!(km.total_value, 0.0);
    }

    #[test]
    fn enrichment_state_detail_accessor() {
        let detail = EnrichmentDetail {
            victim_character_id: Some(5),
            ..Default::default()
        };
        let state = EnrichmentState::Enriched(detail.clone());
        assert_eq!(state.detail(), Some(&detail));
        assert!(state.is_terminal());
        assert!(!EnrichmentState::Pending.is_terminal());
        assert!(detail.involves_character(5));
    }
}
