use std::collections::BTreeMap;

use killwatch_core::{EnrichmentDetail, EnrichmentState, Tier};

use crate::category::Category;
use crate::context::EvaluationContext;
use crate::engine::InterestEngine;
use crate::profile::{InterestProfile, RulesConfig};
use crate::result::{FilterReason, GateFailure, GateKind, GateMiss};
use crate::signals::test_support::sample_kill;
use crate::signals::SignalSet;

fn signals(entries: &[(Category, &str)]) -> SignalSet {
    let mut set = SignalSet::default();
    for (cat, yaml) in entries {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        set.set_from_value(*cat, raw).unwrap();
    }
    set
}

fn value_only() -> InterestProfile {
    InterestProfile {
        weights: BTreeMap::from([(Category::Value, 1.0)]),
        signals: signals(&[(Category::Value, "floor: 10000000\nceiling: 10000000000")]),
        ..InterestProfile::default()
    }
}

fn rules(notify: &[&str], ignore: &[&str]) -> RulesConfig {
    RulesConfig {
        always_notify: notify.iter().map(|s| s.to_string()).collect(),
        always_ignore: ignore.iter().map(|s| s.to_string()).collect(),
        ..RulesConfig::default()
    }
}

#[test]
fn scores_single_category_on_log_scale() {
    let kill = sample_kill();
    let ctx = EvaluationContext::new(kill.kill_time);
    let result = InterestEngine::new().evaluate(&kill, &ctx, &value_only());

    // ln(25) / ln(1000)
    assert!((result.score - 0.466).abs() < 0.001, "score = {}", result.score);
    assert_eq!(result.tier, Tier::Digest);
    assert!(result.filter_reason.is_none());
    let value = &result.categories[&Category::Value];
    assert!(value.matched);
    assert_eq!(result.top_categories()[0].0, Category::Value);
}

#[test]
fn ignore_wins_over_notify() {
    let mut kill = sample_kill();
    kill.is_pod_kill = true;
    kill.total_value = 5.0e9;
    let ctx = EvaluationContext::new(kill.kill_time);
    let profile = InterestProfile {
        rules: rules(&["high_value"], &["pod_kill"]),
        ..value_only()
    };

    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    assert_eq!(result.tier, Tier::Filter);
    assert_eq!(result.score, 0.0);
    assert!(result.is_ignored());
    assert_eq!(
        result.filter_reason,
        Some(FilterReason::IgnoredByRule {
            rule: "pod_kill".into()
        })
    );
}

#[test]
fn notify_rule_lifts_tier_and_skips_gates() {
    let mut kill = sample_kill();
    kill.attackers.count = 1;
    let ctx = EvaluationContext::new(kill.kill_time);
    let profile = InterestProfile {
        weights: BTreeMap::new(),
        rules: RulesConfig {
            require_all: vec!["location".into()],
            ..rules(&["solo_kill"], &[])
        },
        ..InterestProfile::default()
    };

    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    assert_eq!(result.score, 0.0);
    assert_eq!(result.tier, Tier::Notify);
    assert_eq!(result.matched_rules, vec!["solo_kill".to_string()]);
    assert!(result.should_notify());
}

#[test]
fn notify_rule_keeps_priority_when_score_earns_it() {
    let mut kill = sample_kill();
    kill.total_value = 2.0e10;
    kill.attackers.count = 1;
    let ctx = EvaluationContext::new(kill.kill_time);
    let profile = InterestProfile {
        rules: rules(&["solo_kill"], &[]),
        ..value_only()
    };

    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    assert_eq!(result.score, 1.0);
    assert_eq!(result.tier, Tier::Priority);
}

#[test]
fn require_all_reports_each_failing_category() {
    let kill = sample_kill();
    let ctx = EvaluationContext::new(kill.kill_time);
    let mut profile = value_only();
    profile.weights.insert(Category::Routes, 1.0);
    profile.rules.require_all = vec!["value".into(), "location".into(), "routes".into()];

    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    assert_eq!(result.tier, Tier::Filter);
    assert_eq!(result.score, 0.0);
    assert_eq!(
        result.filter_reason,
        Some(FilterReason::GateFailed {
            gate: GateKind::RequireAll,
            misses: vec![
                GateMiss {
                    category: "location".into(),
                    cause: GateFailure::Disabled,
                },
                GateMiss {
                    category: "routes".into(),
                    cause: GateFailure::NotConfigured,
                },
            ],
        })
    );
}

#[test]
fn require_any_passes_on_one_match() {
    let kill = sample_kill();
    let ctx = EvaluationContext::new(kill.kill_time);
    let mut profile = value_only();
    profile.rules.require_any = vec!["plex".into(), "value".into()];
    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    assert_eq!(result.tier, Tier::Digest);

    profile.rules.require_any = vec!["plex".into()];
    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    match result.filter_reason {
        Some(FilterReason::GateFailed { gate, misses }) => {
            assert_eq!(gate, GateKind::RequireAny);
            assert_eq!(misses[0].cause, GateFailure::UnknownCategory);
        }
        other => panic!("expected gate failure, got {other:?}"),
    }
}

#[test]
fn unmatched_value_gate_fails_with_no_match() {
    let mut kill = sample_kill();
    kill.total_value = 1_000.0;
    let ctx = EvaluationContext::new(kill.kill_time);
    let mut profile = value_only();
    profile.rules.require_all = vec!["value".into()];

    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    let reason = result.filter_reason.unwrap();
    assert_eq!(reason.to_string(), "require_all gate failed: value (no match)");
}

#[test]
fn unknown_rule_warns_and_never_matches() {
    let kill = sample_kill();
    let ctx = EvaluationContext::new(kill.kill_time);
    let profile = InterestProfile {
        rules: rules(&["definitely_not_a_rule"], &[]),
        ..value_only()
    };

    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    assert!(result.matched_rules.is_empty());
    assert_eq!(result.tier, Tier::Digest);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("definitely_not_a_rule"));
}

#[test]
fn below_digest_is_filtered_with_reason() {
    let mut kill = sample_kill();
    kill.total_value = 1.2e7;
    let ctx = EvaluationContext::new(kill.kill_time);
    let result = InterestEngine::new().evaluate(&kill, &ctx, &value_only());
    assert_eq!(result.tier, Tier::Filter);
    assert!(matches!(
        result.filter_reason,
        Some(FilterReason::BelowThreshold { .. })
    ));
}

#[test]
fn zero_weights_score_zero() {
    let kill = sample_kill();
    let ctx = EvaluationContext::new(kill.kill_time);
    let profile = InterestProfile {
        weights: BTreeMap::from([(Category::Value, 0.0)]),
        ..value_only()
    };
    let result = InterestEngine::new().evaluate(&kill, &ctx, &profile);
    assert_eq!(result.score, 0.0);
    assert_eq!(result.tier, Tier::Filter);
}

fn character_watch() -> InterestProfile {
    InterestProfile {
        weights: BTreeMap::from([(Category::Value, 1.0), (Category::Politics, 1.0)]),
        signals: signals(&[
            (Category::Value, "floor: 10000000\nceiling: 10000000000"),
            (Category::Politics, "characters: [90000042]"),
        ]),
        ..InterestProfile::default()
    }
}

#[test]
fn prefetch_bounds_bracket_pending_categories() {
    let kill = sample_kill();
    let ctx = EvaluationContext::new(kill.kill_time);
    let engine = InterestEngine::new();
    let profile = character_watch();
    assert!(engine.needs_detail(&profile));

    let bounds = engine.calculate_prefetch_bounds(&kill, &ctx, &profile);
    assert_eq!(bounds.awaiting_detail, vec![Category::Politics]);
    assert!(bounds.known.is_none());
    // sqrt(0.466^2 / 2) and sqrt((0.466^2 + 1) / 2)
    assert!((bounds.lower - 0.3295).abs() < 0.001, "lower = {}", bounds.lower);
    assert!((bounds.upper - 0.7801).abs() < 0.001, "upper = {}", bounds.upper);
    assert!(bounds.should_fetch(0.5));
    assert!(!bounds.should_fetch(0.9));
}

#[test]
fn prefetch_bounds_collapse_once_enriched() {
    let kill = sample_kill();
    let detail = EnrichmentDetail {
        attacker_character_ids: vec![90000042],
        ..EnrichmentDetail::default()
    };
    let ctx = EvaluationContext::new(kill.kill_time).with_enrichment(EnrichmentState::Enriched(detail));
    let engine = InterestEngine::new();
    let profile = character_watch();

    let bounds = engine.calculate_prefetch_bounds(&kill, &ctx, &profile);
    assert!(bounds.awaiting_detail.is_empty());
    assert_eq!(bounds.known, Some(bounds.lower));
    assert_eq!(bounds.lower, bounds.upper);
    assert!(!bounds.should_fetch(0.0));

    let result = engine.evaluate(&kill, &ctx, &profile);
    assert!((result.score - bounds.lower).abs() < 1e-12);
    assert!(result.categories[&Category::Politics].matched);
}

#[test]
fn detail_dependent_notify_rule_forces_fetch() {
    let kill = sample_kill();
    let ctx = EvaluationContext::new(kill.kill_time);
    let profile = InterestProfile {
        rules: rules(&["watched_character"], &[]),
        ..value_only()
    };
    let bounds = InterestEngine::new().calculate_prefetch_bounds(&kill, &ctx, &profile);
    assert!(bounds.known.is_some());
    assert!(bounds.notify_rule_needs_detail);
    assert!(bounds.should_fetch(0.99));
}

#[test]
fn free_function_uses_builtin_engine() {
    let kill = sample_kill();
    let ctx = EvaluationContext::new(kill.kill_time);
    let profile = value_only();
    assert_eq!(
        crate::evaluate(&kill, &ctx, &profile),
        InterestEngine::new().evaluate(&kill, &ctx, &profile)
    );
}
