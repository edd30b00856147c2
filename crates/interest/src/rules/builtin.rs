use std::collections::BTreeMap;

use killwatch_core::Killmail;

use super::Rule;
use crate::context::EvaluationContext;
use crate::profile::InterestProfile;
use crate::validation::ValidationResult;

pub const DEFAULT_HIGH_VALUE_ISK: f64 = 1.0e9;
pub const DEFAULT_LARGE_FLEET_SIZE: f64 = 20.0;

fn positive_param(params: &BTreeMap<String, f64>, key: &str, result: &mut ValidationResult) {
    if let Some(v) = params.get(key) {
        if !(*v > 0.0) || !v.is_finite() {
            result.error(format!("rules.params.{key}"), "must be a positive number");
        }
    }
}

pub struct PodKill;

impl Rule for PodKill {
    fn name(&self) -> &str {
        "pod_kill"
    }

    fn evaluate(&self, kill: &Killmail, _: &EvaluationContext, _: &InterestProfile) -> bool {
        kill.is_pod_kill
    }
}

/// Only NPC corporations on the attacking side.
pub struct NpcOnly;

impl Rule for NpcOnly {
    fn name(&self) -> &str {
        "npc_only"
    }

    fn evaluate(&self, kill: &Killmail, _: &EvaluationContext, _: &InterestProfile) -> bool {
        kill.attackers.is_npc_only()
    }
}

pub struct SoloKill;

impl Rule for SoloKill {
    fn name(&self) -> &str {
        "solo_kill"
    }

    fn evaluate(&self, kill: &Killmail, _: &EvaluationContext, _: &InterestProfile) -> bool {
        kill.attackers.count == 1
    }
}

/// At least `large_fleet_size` attackers (default 20).
pub struct LargeFleet;

impl Rule for LargeFleet {
    fn name(&self) -> &str {
        "large_fleet"
    }

    fn evaluate(&self, kill: &Killmail, _: &EvaluationContext, profile: &InterestProfile) -> bool {
        let size = profile
            .param("large_fleet_size")
            .unwrap_or(DEFAULT_LARGE_FLEET_SIZE);
        f64::from(kill.attackers.count) >= size
    }

    fn validate(&self, params: &BTreeMap<String, f64>, result: &mut ValidationResult) {
        positive_param(params, "large_fleet_size", result);
    }
}

/// Total value at or above `high_value_isk` (default 1B).
pub struct HighValue;

impl Rule for HighValue {
    fn name(&self) -> &str {
        "high_value"
    }

    fn evaluate(&self, kill: &Killmail, _: &EvaluationContext, profile: &InterestProfile) -> bool {
        kill.total_value >= profile.param("high_value_isk").unwrap_or(DEFAULT_HIGH_VALUE_ISK)
    }

    fn validate(&self, params: &BTreeMap<String, f64>, result: &mut ValidationResult) {
        positive_param(params, "high_value_isk", result);
    }
}

pub struct Gatecamp;

impl Rule for Gatecamp {
    fn name(&self) -> &str {
        "gatecamp"
    }

    fn evaluate(&self, _: &Killmail, ctx: &EvaluationContext, _: &InterestProfile) -> bool {
        ctx.ambush.is_some()
    }
}

pub struct SmartbombCamp;

impl Rule for SmartbombCamp {
    fn name(&self) -> &str {
        "smartbomb_camp"
    }

    fn evaluate(&self, _: &Killmail, ctx: &EvaluationContext, _: &InterestProfile) -> bool {
        ctx.ambush.as_ref().is_some_and(|a| a.smartbomb)
    }
}

/// Kill belongs to an active war involving a watched entity (war or
/// politics signal).
pub struct WarTarget;

impl Rule for WarTarget {
    fn name(&self) -> &str {
        "war_target"
    }

    fn evaluate(&self, _: &Killmail, ctx: &EvaluationContext, profile: &InterestProfile) -> bool {
        let Some(rel) = ctx.war.as_ref().and_then(|w| w.relationship.as_ref()) else {
            return false;
        };
        if !rel.is_active(ctx.now) {
            return false;
        }
        let by_war = profile
            .signals
            .war
            .as_ref()
            .is_some_and(|w| w.watches_relationship(rel.pair.low, rel.pair.high));
        let by_politics = profile
            .signals
            .politics
            .as_ref()
            .is_some_and(|p| p.watches(rel.pair.low) || p.watches(rel.pair.high));
        by_war || by_politics
    }
}

/// Victim corporation or alliance is watched in the politics signal.
pub struct WatchedVictim;

impl Rule for WatchedVictim {
    fn name(&self) -> &str {
        "watched_victim"
    }

    fn evaluate(&self, kill: &Killmail, _: &EvaluationContext, profile: &InterestProfile) -> bool {
        let Some(p) = profile.signals.politics.as_ref() else {
            return false;
        };
        kill.victim_corporation_id.is_some_and(|c| p.watches(c))
            || kill.victim_alliance_id.is_some_and(|a| p.watches(a))
    }
}

/// A watched character took part. Needs enrichment detail.
pub struct WatchedCharacter;

impl Rule for WatchedCharacter {
    fn name(&self) -> &str {
        "watched_character"
    }

    fn evaluate(&self, _: &Killmail, ctx: &EvaluationContext, profile: &InterestProfile) -> bool {
        let (Some(p), Some(detail)) = (profile.signals.politics.as_ref(), ctx.detail()) else {
            return false;
        };
        p.characters.iter().any(|c| detail.involves_character(*c))
    }

    fn prefetch_capable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, TimeZone, Utc};
    use killwatch_core::{AttackerSummary, EnrichmentDetail, EnrichmentState};
    use killwatch_patterns::WarTracker;

    use super::*;
    use crate::signals::{PoliticsSignal, SignalSet};

    fn kill() -> Killmail {
        Killmail {
            kill_id: 42,
            kill_time: Utc.with_ymd_and_hms(2026, 2, 2, 2, 2, 2).unwrap(),
            solar_system_id: 30000142,
            victim_ship_type_id: 670,
            victim_corporation_id: Some(98_000_001),
            victim_alliance_id: Some(99_000_001),
            attackers: AttackerSummary {
                count: 1,
                corporation_ids: BTreeSet::from([98_000_002]),
                alliance_ids: BTreeSet::from([99_000_002]),
                ship_type_ids: BTreeSet::from([587]),
            },
            final_blow_ship_type_id: Some(587),
            total_value: 2.0e9,
            is_pod_kill: true,
            hash: "x".into(),
        }
    }

    fn profile_watching(ids: Vec<i64>, characters: Vec<i64>) -> InterestProfile {
        InterestProfile {
            signals: SignalSet {
                politics: Some(PoliticsSignal {
                    corporations: vec![],
                    alliances: ids,
                    characters,
                    victim: true,
                    attacker: true,
                }),
                ..Default::default()
            },
            ..InterestProfile::default()
        }
    }

    #[test]
    fn simple_predicates() {
        let k = kill();
        let ctx = EvaluationContext::new(k.kill_time);
        let p = InterestProfile::default();
        assert!(PodKill.evaluate(&k, &ctx, &p));
        assert!(SoloKill.evaluate(&k, &ctx, &p));
        assert!(!NpcOnly.evaluate(&k, &ctx, &p));
        assert!(HighValue.evaluate(&k, &ctx, &p));
        assert!(!LargeFleet.evaluate(&k, &ctx, &p));
        assert!(!Gatecamp.evaluate(&k, &ctx, &p));
    }

    #[test]
    fn params_override_defaults() {
        let k = kill();
        let ctx = EvaluationContext::new(k.kill_time);
        let mut p = InterestProfile::default();
        p.rules.params.insert("high_value_isk".into(), 5.0e9);
        p.rules.params.insert("large_fleet_size".into(), 1.0);
        assert!(!HighValue.evaluate(&k, &ctx, &p));
        assert!(LargeFleet.evaluate(&k, &ctx, &p));

        let mut result = ValidationResult::new();
        let bad = BTreeMap::from([("high_value_isk".to_string(), -1.0)]);
        HighValue.validate(&bad, &mut result);
        assert!(!result.valid);
    }

    #[test]
    fn war_target_uses_watched_entities() {
        let k = kill();
        let mut tracker = WarTracker::default();
        tracker.register_authoritative(99_000_002, 99_000_001, k.kill_time, k.kill_time + Duration::days(3));
        let ctx = EvaluationContext::new(k.kill_time).with_war(tracker.check_kill(&k, k.kill_time));

        assert!(WarTarget.evaluate(&k, &ctx, &profile_watching(vec![99_000_001], vec![])));
        assert!(!WarTarget.evaluate(&k, &ctx, &profile_watching(vec![99_000_777], vec![])));
    }

    #[test]
    fn watched_character_needs_detail() {
        let k = kill();
        let profile = profile_watching(vec![], vec![91_000_000]);
        assert!(!WatchedCharacter.prefetch_capable());

        let pending = EvaluationContext::new(k.kill_time);
        assert!(!WatchedCharacter.evaluate(&k, &pending, &profile));

        let enriched = pending.with_enrichment(EnrichmentState::Enriched(EnrichmentDetail {
            victim_character_id: Some(91_000_000),
            ..Default::default()
        }));
        assert!(WatchedCharacter.evaluate(&k, &enriched, &profile));
        assert!(!WatchedVictim.evaluate(&k, &enriched, &profile));
        assert!(WatchedVictim.evaluate(&k, &enriched, &profile_watching(vec![99_000_001], vec![])));
    }
}
