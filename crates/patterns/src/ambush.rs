//! Gate camp (ambush) detection over a short window of one system's kills.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use killwatch_core::{is_npc_corporation, EntityId, KillId, Killmail, SystemId};

use crate::war::{PairKey, WarTracker};

/// Battleship hulls commonly fitted with smartbombs on gate camps.
pub const DEFAULT_SMARTBOMB_HULLS: [EntityId; 12] = [
    638,   // Raven
    639,   // Tempest
    640,   // Scorpion
    641,   // Megathron
    642,   // Apocalypse
    643,   // Armageddon
    644,   // Typhoon
    645,   // Dominix
    24688, // Rokh
    24690, // Hyperion
    24692, // Abaddon
    47466, // Praxis
];

/// Detection thresholds and confidence weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbushConfig {
    /// Look-back window ending at the evaluation time.
    pub window_secs: i64,
    pub min_kills: usize,
    /// Distinct victim corporations that mark a camp on their own.
    pub min_victim_corporations: usize,
    /// Mean attackers per kill above which even a single victim corp is a camp.
    pub asymmetry_ratio: f64,
    /// All window kills within this span (plus a smartbomb hull) flags a smartbomb camp.
    pub smartbomb_span_secs: i64,
    pub smartbomb_hulls: BTreeSet<EntityId>,
    pub consistency_weight: f64,
    pub pod_weight: f64,
    pub asymmetry_weight: f64,
    pub medium_confidence: f64,
    pub high_confidence: f64,
}

impl Default for AmbushConfig {
    fn default() -> Self {
        Self {
            window_secs: 600,
            min_kills: 3,
            min_victim_corporations: 2,
            asymmetry_ratio: 5.0,
            smartbomb_span_secs: 60,
            smartbomb_hulls: DEFAULT_SMARTBOMB_HULLS.into_iter().collect(),
            consistency_weight: 0.35,
            pod_weight: 0.25,
            asymmetry_weight: 0.4,
            medium_confidence: 0.4,
            high_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// A detected camp. Computed per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbushAssessment {
    pub system_id: SystemId,
    pub confidence: Confidence,
    /// Weighted confidence score in [0, 1].
    pub score: f64,
    /// Mean attacker count per kill.
    pub asymmetry: f64,
    pub kill_ids: Vec<KillId>,
    pub victim_corporations: BTreeSet<EntityId>,
    pub attacker_corporations: BTreeSet<EntityId>,
    pub attacker_alliances: BTreeSet<EntityId>,
    pub pod_kills: usize,
    pub smartbomb: bool,
    pub first_kill: DateTime<Utc>,
    pub last_kill: DateTime<Utc>,
}

impl AmbushAssessment {
    pub fn kill_count(&self) -> usize {
        self.kill_ids.len()
    }
}

/// Ambush result after war-attributable kills were set aside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarFilteredAmbush {
    pub ambush: Option<AmbushAssessment>,
    pub war_kills_filtered: usize,
    pub war_parties: BTreeSet<PairKey>,
}

#[derive(Debug, Clone, Default)]
pub struct AmbushDetector {
    config: AmbushConfig,
}

impl AmbushDetector {
    pub fn new(config: AmbushConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AmbushConfig {
        &self.config
    }

    /// Start of the look-back window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::seconds(self.config.window_secs.max(0))
    }

    /// Assess `system_id` at `now`. Kills from other systems or outside the
    /// window are ignored, so callers may pass a loose superset.
    pub fn detect(
        &self,
        system_id: SystemId,
        kills: &[Killmail],
        now: DateTime<Utc>,
    ) -> Option<AmbushAssessment> {
        let window = self.window(system_id, kills, now);
        self.assess(system_id, &window)
    }

    /// Like [`Self::detect`], but kills attributable to an active war
    /// relationship are removed before assessing.
    pub fn detect_with_wars(
        &self,
        system_id: SystemId,
        kills: &[Killmail],
        now: DateTime<Utc>,
        wars: &WarTracker,
    ) -> WarFilteredAmbush {
        let mut remaining = Vec::new();
        let mut war_parties = BTreeSet::new();
        let mut war_kills_filtered = 0;

        for kill in self.window(system_id, kills, now) {
            match wars.check_kill(kill, now).and_then(|c| c.relationship) {
                Some(rel) => {
                    war_kills_filtered += 1;
                    war_parties.insert(rel.pair);
                }
                None => remaining.push(kill),
            }
        }

        if war_kills_filtered > 0 {
            debug!(
                system_id,
                war_kills_filtered,
                parties = war_parties.len(),
                "excluded war kills from ambush window"
            );
        }

        WarFilteredAmbush {
            ambush: self.assess(system_id, &remaining),
            war_kills_filtered,
            war_parties,
        }
    }

    fn window<'a>(
        &self,
        system_id: SystemId,
        kills: &'a [Killmail],
        now: DateTime<Utc>,
    ) -> Vec<&'a Killmail> {
        let start = self.window_start(now);
        let mut window: Vec<&Killmail> = kills
            .iter()
            .filter(|k| k.solar_system_id == system_id && k.kill_time > start && k.kill_time <= now)
            .collect();
        window.sort_by_key(|k| (k.kill_time, k.kill_id));
        window.dedup_by_key(|k| k.kill_id);
        window
    }

    fn assess(&self, system_id: SystemId, window: &[&Killmail]) -> Option<AmbushAssessment> {
        let cfg = &self.config;
        if window.len() < cfg.min_kills.max(1) {
            return None;
        }
        let n = window.len() as f64;

        let victim_corporations: BTreeSet<EntityId> =
            window.iter().filter_map(|k| k.victim_corporation_id).collect();
        let asymmetry = window.iter().map(|k| f64::from(k.attackers.count)).sum::<f64>() / n;

        let diverse = victim_corporations.len() >= cfg.min_victim_corporations;
        let lopsided = asymmetry > cfg.asymmetry_ratio;
        if !diverse && !lopsided {
            return None;
        }

        // Share of kills in which the most frequent player attacker corp took part.
        let mut corp_hits: HashMap<EntityId, usize> = HashMap::new();
        for kill in window {
            for corp in kill.attackers.corporation_ids.iter().filter(|c| !is_npc_corporation(**c)) {
                *corp_hits.entry(*corp).or_default() += 1;
            }
        }
        let consistency = corp_hits.values().copied().max().unwrap_or(0) as f64 / n;

        let pod_kills = window.iter().filter(|k| k.is_pod_kill).count();
        let pod_ratio = pod_kills as f64 / n;

        let asymmetry_factor = if cfg.asymmetry_ratio > 0.0 {
            (asymmetry / cfg.asymmetry_ratio).min(1.0)
        } else {
            1.0
        };

        let total_weight = cfg.consistency_weight + cfg.pod_weight + cfg.asymmetry_weight;
        let score = if total_weight > 0.0 {
            ((cfg.consistency_weight * consistency
                + cfg.pod_weight * pod_ratio
                + cfg.asymmetry_weight * asymmetry_factor)
                / total_weight)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };

        let confidence = if score >= cfg.high_confidence {
            Confidence::High
        } else if score >= cfg.medium_confidence {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        let first_kill = window[0].kill_time;
        let last_kill = window[window.len() - 1].kill_time;
        let tight = last_kill - first_kill <= Duration::seconds(cfg.smartbomb_span_secs.max(0));
        let smartbomb = tight
            && window.iter().any(|k| {
                k.attackers
                    .ship_type_ids
                    .iter()
                    .any(|s| cfg.smartbomb_hulls.contains(s))
            });

        Some(AmbushAssessment {
            system_id,
            confidence,
            score,
            asymmetry,
            kill_ids: window.iter().map(|k| k.kill_id).collect(),
            victim_corporations,
            attacker_corporations: window
                .iter()
                .flat_map(|k| k.attackers.corporation_ids.iter().copied())
                .collect(),
            attacker_alliances: window
                .iter()
                .flat_map(|k| k.attackers.alliance_ids.iter().copied())
                .collect(),
            pod_kills,
            smartbomb,
            first_kill,
            last_kill,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use killwatch_core::AttackerSummary;

    const SYSTEM: SystemId = 30002813;
    const CAMPERS: EntityId = 98_500_000;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, 20, 0, 0).unwrap()
    }

    fn kill(id: i64, secs_ago: i64, victim_corp: EntityId, attackers: u32) -> Killmail {
        Killmail {
            kill_id: id,
            kill_time: now() - Duration::seconds(secs_ago),
            solar_system_id: SYSTEM,
            victim_ship_type_id: 11188,
            victim_corporation_id: Some(victim_corp),
            victim_alliance_id: None,
            attackers: AttackerSummary {
                count: attackers,
                corporation_ids: BTreeSet::from([CAMPERS]),
                alliance_ids: BTreeSet::new(),
                ship_type_ids: BTreeSet::from([11987]),
            },
            final_blow_ship_type_id: Some(11987),
            total_value: 5.0e7,
            is_pod_kill: false,
            hash: format!("h{id}"),
        }
    }

    #[test]
    fn diverse_victims_and_numbers_make_a_camp() {
        let kills = vec![
            kill(1, 300, 98_000_001, 8),
            kill(2, 200, 98_000_002, 8),
            kill(3, 100, 98_000_003, 8),
        ];
        let detector = AmbushDetector::default();
        let found = detector.detect(SYSTEM, &kills, now()).unwrap();
        assert!(found.confidence >= Confidence::Medium);
        assert_eq!(found.kill_count(), 3);
        assert_eq!(found.asymmetry, 8.0);
        assert_eq!(found.victim_corporations.len(), 3);
        assert!(!found.smartbomb);
    }

    #[test]
    fn small_fight_against_one_corp_is_not_a_camp() {
        let kills = vec![
            kill(1, 300, 98_000_001, 2),
            kill(2, 200, 98_000_001, 2),
            kill(3, 100, 98_000_001, 2),
        ];
        assert!(AmbushDetector::default().detect(SYSTEM, &kills, now()).is_none());
    }

    #[test]
    fn lopsided_numbers_against_one_corp_is_a_camp() {
        let kills = vec![
            kill(1, 300, 98_000_001, 20),
            kill(2, 200, 98_000_001, 20),
            kill(3, 100, 98_000_001, 20),
        ];
        let found = AmbushDetector::default().detect(SYSTEM, &kills, now()).unwrap();
        assert_eq!(found.victim_corporations.len(), 1);
    }

    #[test]
    fn needs_minimum_kills_in_window() {
        let kills = vec![
            kill(1, 3600, 98_000_001, 8),
            kill(2, 200, 98_000_002, 8),
            kill(3, 100, 98_000_003, 8),
        ];
        assert!(AmbushDetector::default().detect(SYSTEM, &kills, now()).is_none());

        let mut other_system = kill(4, 50, 98_000_004, 8);
        other_system.solar_system_id = 30000142;
        let kills = vec![kills[1].clone(), kills[2].clone(), other_system];
        assert!(AmbushDetector::default().detect(SYSTEM, &kills, now()).is_none());
    }

    #[test]
    fn pods_and_consistency_raise_confidence() {
        let mut kills = vec![
            kill(1, 300, 98_000_001, 10),
            kill(2, 200, 98_000_002, 10),
            kill(3, 100, 98_000_003, 10),
        ];
        for k in &mut kills {
            k.is_pod_kill = true;
        }
        let found = AmbushDetector::default().detect(SYSTEM, &kills, now()).unwrap();
        assert_eq!(found.confidence, Confidence::High);
        assert_eq!(found.pod_kills, 3);
    }

    #[test]
    fn smartbomb_needs_tight_span_and_hull() {
        let mut kills = vec![
            kill(1, 40, 98_000_001, 6),
            kill(2, 20, 98_000_002, 6),
            kill(3, 0, 98_000_003, 6),
        ];
        kills[1].attackers.ship_type_ids.insert(641);
        let found = AmbushDetector::default().detect(SYSTEM, &kills, now()).unwrap();
        assert!(found.smartbomb);

        kills[0].kill_time = now() - Duration::seconds(120);
        let found = AmbushDetector::default().detect(SYSTEM, &kills, now()).unwrap();
        assert!(!found.smartbomb);
    }

    #[test]
    fn war_kills_are_set_aside() {
        let war_a: EntityId = 99_000_001;
        let war_b: EntityId = 99_000_002;

        let mut tracker = WarTracker::default();
        tracker.register_authoritative(war_a, war_b, now() - Duration::days(1), now() + Duration::days(6));

        let mut kills: Vec<Killmail> = (1..=5)
            .map(|i| kill(i, 60 * i, 98_000_000 + i, 8))
            .collect();
        for k in kills.iter_mut().take(2) {
            k.victim_alliance_id = Some(war_b);
            k.attackers.alliance_ids = BTreeSet::from([war_a]);
        }

        let result = AmbushDetector::default().detect_with_wars(SYSTEM, &kills, now(), &tracker);
        assert_eq!(result.war_kills_filtered, 2);
        assert_eq!(result.war_parties, BTreeSet::from([PairKey::new(war_a, war_b)]));
        let ambush = result.ambush.unwrap();
        assert_eq!(ambush.kill_count(), 3);
        assert!(!ambush.kill_ids.contains(&1));
    }

    #[test]
    fn war_filtering_can_dissolve_a_camp() {
        let mut tracker = WarTracker::default();
        tracker.register_authoritative(99_000_001, 99_000_002, now() - Duration::days(1), now() + Duration::days(1));
        let mut kills: Vec<Killmail> = (1..=3)
            .map(|i| kill(i, 60 * i, 98_000_000 + i, 8))
            .collect();
        kills[0].victim_alliance_id = Some(99_000_002);
        kills[0].attackers.alliance_ids = BTreeSet::from([99_000_001]);

        let result = AmbushDetector::default().detect_with_wars(SYSTEM, &kills, now(), &tracker);
        assert_eq!(result.war_kills_filtered, 1);
        assert!(result.ambush.is_none());
    }
}
