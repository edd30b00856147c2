//! Template views for kills and scoring results.

use std::collections::BTreeMap;

use killwatch_core::{Killmail, SystemId};
use killwatch_interest::InterestResult;
use killwatch_notify::{InterestView, KillView};
use killwatch_patterns::{AmbushAssessment, WarCheck, WarSource};

/// Matched categories listed in a notification.
const TOP_CATEGORIES: usize = 3;

pub fn kill_view(kill: &Killmail, system_names: &BTreeMap<SystemId, String>) -> KillView {
    KillView::new(kill, system_names.get(&kill.solar_system_id).cloned())
}

pub fn interest_view(
    profile: &str,
    result: &InterestResult,
    ambush: Option<&AmbushAssessment>,
    war: Option<&WarCheck>,
) -> InterestView {
    InterestView {
        profile: profile.to_string(),
        score: result.score,
        tier: result.tier,
        matched_rules: result.matched_rules.clone(),
        top_categories: result
            .top_categories()
            .into_iter()
            .take(TOP_CATEGORIES)
            .map(|(category, breakdown)| (category.to_string(), breakdown.score))
            .collect(),
        ambush: ambush.map(describe_ambush),
        war: war.and_then(describe_war),
    }
}

/// e.g. `high confidence camp: 4 kills, 6.5x asymmetry, smartbomb`
pub fn describe_ambush(ambush: &AmbushAssessment) -> String {
    let mut text = format!(
        "{} confidence camp: {} kills, {:.1}x asymmetry",
        ambush.confidence.as_str(),
        ambush.kill_count(),
        ambush.asymmetry
    );
    if ambush.smartbomb {
        text.push_str(", smartbomb");
    }
    text
}

/// `None` unless the kill falls under an active relationship.
pub fn describe_war(check: &WarCheck) -> Option<String> {
    let relationship = check.relationship.as_ref()?;
    let source = match relationship.source {
        WarSource::Authoritative => "declared",
        WarSource::Inferred => "inferred",
    };
    let side = match check.attacker_is_aggressor() {
        Some(true) => "aggressor",
        _ => "defender",
    };
    let mut text = format!(
        "{source} war {} vs {} ({} kills), attacker is {side}",
        relationship.pair.low, relationship.pair.high, relationship.kill_count
    );
    if relationship.mutual {
        text.push_str(", mutual");
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use killwatch_patterns::{PairKey, WarRelationship};

    #[test]
    fn war_description_names_source_and_side() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let check = WarCheck {
            attacker: 99,
            victim: 11,
            relationship: Some(WarRelationship {
                pair: PairKey::new(99, 11),
                aggressor: 99,
                first_observed: now,
                last_observed: now,
                mutual: true,
                source: WarSource::Authoritative,
                kill_count: 4,
                expires_at: now + Duration::days(7),
            }),
        };
        assert_eq!(
            describe_war(&check).as_deref(),
            Some("declared war 11 vs 99 (4 kills), attacker is aggressor, mutual")
        );

        let no_war = WarCheck {
            relationship: None,
            ..check
        };
        assert_eq!(describe_war(&no_war), None);
    }

    #[test]
    fn kill_view_uses_known_system_name() {
        let kill = Killmail {
            kill_id: 1,
            kill_time: Utc::now(),
            solar_system_id: 30002187,
            victim_ship_type_id: 670,
            victim_corporation_id: None,
            victim_alliance_id: None,
            attackers: Default::default(),
            final_blow_ship_type_id: None,
            total_value: 0.0,
            is_pod_kill: true,
            hash: "x".into(),
        };
        let names = BTreeMap::from([(30002187, "Amamake".to_string())]);
        assert_eq!(kill_view(&kill, &names).system_name.as_deref(), Some("Amamake"));
        assert_eq!(kill_view(&kill, &BTreeMap::new()).system_name, None);
    }
}
