//! The interest engine: rules, gates and weighted scoring.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use tracing::trace;

use killwatch_core::{Killmail, Tier};

use crate::aggregate::{aggregate, WeightedScore};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::profile::{InterestProfile, RulesConfig};
use crate::result::{
    CategoryBreakdown, CategoryStatus, FilterReason, GateFailure, GateKind, GateMiss,
    InterestResult, PrefetchBounds,
};
use crate::rules::{Rule, RuleRegistry};
use crate::signals::{CategoryScorer, ScorerRegistry};

/// Scorer and rule registries plus the evaluation pipeline. Pure: no I/O.
#[derive(Debug, Clone, Default)]
pub struct InterestEngine {
    scorers: ScorerRegistry,
    rules: RuleRegistry,
}

/// Score `kill` with the built-in scorers and rules.
pub fn evaluate(kill: &Killmail, ctx: &EvaluationContext, profile: &InterestProfile) -> InterestResult {
    default_engine().evaluate(kill, ctx, profile)
}

pub fn calculate_prefetch_bounds(
    kill: &Killmail,
    ctx: &EvaluationContext,
    profile: &InterestProfile,
) -> PrefetchBounds {
    default_engine().calculate_prefetch_bounds(kill, ctx, profile)
}

fn default_engine() -> &'static InterestEngine {
    static ENGINE: OnceLock<InterestEngine> = OnceLock::new();
    ENGINE.get_or_init(InterestEngine::new)
}

impl InterestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registries(scorers: ScorerRegistry, rules: RuleRegistry) -> Self {
        Self { scorers, rules }
    }

    pub fn scorers(&self) -> &ScorerRegistry {
        &self.scorers
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn register_scorer(&mut self, scorer: Arc<dyn CategoryScorer>) {
        self.scorers.register(scorer);
    }

    pub fn register_rule(&mut self, rule: Arc<dyn Rule>) {
        self.rules.register(rule);
    }

    /// Whether `profile` can ever need enrichment detail.
    pub fn needs_detail(&self, profile: &InterestProfile) -> bool {
        let category_needs = Category::ALL.iter().any(|cat| {
            profile.is_enabled(*cat)
                && self
                    .scorers
                    .get(*cat)
                    .is_some_and(|s| !s.prefetch_capable(&profile.signals))
        });
        category_needs || self.notify_rule_needs_detail(&profile.rules)
    }

    fn notify_rule_needs_detail(&self, rules: &RulesConfig) -> bool {
        rules
            .always_notify
            .iter()
            .filter_map(|name| self.rules.get(name))
            .any(|r| !r.prefetch_capable())
    }

    /// Evaluate one kill.
    ///
    /// Precedence: `always_ignore` (filter), `always_notify` (tier at least
    /// NOTIFY, skips gates and thresholds), gates, then threshold scoring.
    pub fn evaluate(
        &self,
        kill: &Killmail,
        ctx: &EvaluationContext,
        profile: &InterestProfile,
    ) -> InterestResult {
        let mut warnings = Vec::new();

        let ignored = self.match_rules(&profile.rules.always_ignore, kill, ctx, profile, &mut warnings);
        if let Some(rule) = ignored.first() {
            trace!(kill_id = kill.kill_id, rule = %rule, "ignored by rule");
            return InterestResult {
                score: 0.0,
                tier: Tier::Filter,
                categories: BTreeMap::new(),
                matched_rules: vec![rule.clone()],
                thresholds: profile.thresholds,
                aggregation: profile.aggregation,
                filter_reason: Some(FilterReason::IgnoredByRule { rule: rule.clone() }),
                warnings,
                awaiting_detail: Vec::new(),
            };
        }

        let forced = self.match_rules(&profile.rules.always_notify, kill, ctx, profile, &mut warnings);
        let categories = self.score_categories(kill, ctx, profile);
        let awaiting_detail = awaiting(&categories);

        if forced.is_empty() {
            if let Some(reason) = check_gates(&profile.rules, &categories) {
                return InterestResult {
                    score: 0.0,
                    tier: Tier::Filter,
                    categories,
                    matched_rules: Vec::new(),
                    thresholds: profile.thresholds,
                    aggregation: profile.aggregation,
                    filter_reason: Some(reason),
                    warnings,
                    awaiting_detail,
                };
            }
        }

        let score = aggregate(
            profile.aggregation,
            &weighted(&categories, |_, b| (b.score, b.matched)),
            profile.max_penalty,
        );
        let mut tier = profile.thresholds.tier_for(score);
        if !forced.is_empty() && tier < Tier::Notify {
            tier = Tier::Notify;
        }
        let filter_reason = (tier == Tier::Filter).then(|| FilterReason::BelowThreshold {
            score,
            digest: profile.thresholds.digest,
        });

        InterestResult {
            score,
            tier,
            categories,
            matched_rules: forced,
            thresholds: profile.thresholds,
            aggregation: profile.aggregation,
            filter_reason,
            warnings,
            awaiting_detail,
        }
    }

    /// Bounds on the aggregate before detail is fetched.
    ///
    /// Categories waiting on detail count as 0 for `lower` and as the
    /// profile's `detail_upper_bound` (matched) for `upper`.
    pub fn calculate_prefetch_bounds(
        &self,
        kill: &Killmail,
        ctx: &EvaluationContext,
        profile: &InterestProfile,
    ) -> PrefetchBounds {
        let categories = self.score_categories(kill, ctx, profile);
        let awaiting_detail = awaiting(&categories);

        let lower = aggregate(
            profile.aggregation,
            &weighted(&categories, |_, b| match b.status {
                CategoryStatus::AwaitingDetail => (0.0, false),
                _ => (b.score, b.matched),
            }),
            profile.max_penalty,
        );
        let upper = aggregate(
            profile.aggregation,
            &weighted(&categories, |_, b| match b.status {
                CategoryStatus::AwaitingDetail => (profile.detail_upper_bound, true),
                _ => (b.score, b.matched),
            }),
            profile.max_penalty,
        )
        .max(lower);

        PrefetchBounds {
            known: awaiting_detail.is_empty().then_some(lower),
            lower,
            upper: if awaiting_detail.is_empty() { lower } else { upper },
            notify_rule_needs_detail: ctx.awaiting_detail()
                && self.notify_rule_needs_detail(&profile.rules),
            awaiting_detail,
        }
    }

    fn match_rules(
        &self,
        names: &[String],
        kill: &Killmail,
        ctx: &EvaluationContext,
        profile: &InterestProfile,
        warnings: &mut Vec<String>,
    ) -> Vec<String> {
        let mut matched = Vec::new();
        for name in names {
            match self.rules.get(name) {
                Some(rule) => {
                    if rule.evaluate(kill, ctx, profile) {
                        matched.push(name.clone());
                    }
                }
                None => warnings.push(format!("unknown rule '{name}' never matches")),
            }
        }
        matched
    }

    fn score_categories(
        &self,
        kill: &Killmail,
        ctx: &EvaluationContext,
        profile: &InterestProfile,
    ) -> BTreeMap<Category, CategoryBreakdown> {
        Category::ALL
            .iter()
            .map(|cat| {
                let weight = profile.weight(*cat);
                if weight <= 0.0 {
                    return (*cat, CategoryBreakdown::inactive(0.0, CategoryStatus::Disabled));
                }
                let Some(scorer) = self.scorers.get(*cat) else {
                    return (*cat, CategoryBreakdown::inactive(weight, CategoryStatus::NotConfigured));
                };
                let Some(scored) = scorer.evaluate(kill, ctx, &profile.signals) else {
                    return (*cat, CategoryBreakdown::inactive(weight, CategoryStatus::NotConfigured));
                };
                let status = if ctx.awaiting_detail() && !scorer.prefetch_capable(&profile.signals) {
                    CategoryStatus::AwaitingDetail
                } else {
                    CategoryStatus::Scored
                };
                (
                    *cat,
                    CategoryBreakdown {
                        weight,
                        score: scored.score,
                        matched: scored.matched,
                        status,
                        note: scored.note,
                    },
                )
            })
            .collect()
    }
}

fn awaiting(categories: &BTreeMap<Category, CategoryBreakdown>) -> Vec<Category> {
    categories
        .iter()
        .filter(|(_, b)| b.status == CategoryStatus::AwaitingDetail)
        .map(|(c, _)| *c)
        .collect()
}

fn weighted(
    categories: &BTreeMap<Category, CategoryBreakdown>,
    pick: impl Fn(Category, &CategoryBreakdown) -> (f64, bool),
) -> Vec<WeightedScore> {
    categories
        .iter()
        .filter(|(_, b)| b.is_active())
        .map(|(c, b)| {
            let (score, matched) = pick(*c, b);
            WeightedScore {
                weight: b.weight,
                score,
                matched,
            }
        })
        .collect()
}

fn gate_check(name: &str, categories: &BTreeMap<Category, CategoryBreakdown>) -> Option<GateMiss> {
    let cause = match name.parse::<Category>() {
        Err(_) => GateFailure::UnknownCategory,
        Ok(cat) => match categories.get(&cat) {
            None => GateFailure::Disabled,
            Some(b) => match b.status {
                CategoryStatus::Disabled => GateFailure::Disabled,
                CategoryStatus::NotConfigured => GateFailure::NotConfigured,
                _ if b.matched => return None,
                _ => GateFailure::NoMatch,
            },
        },
    };
    Some(GateMiss {
        category: name.to_string(),
        cause,
    })
}

fn check_gates(
    rules: &RulesConfig,
    categories: &BTreeMap<Category, CategoryBreakdown>,
) -> Option<FilterReason> {
    let misses: Vec<GateMiss> = rules
        .require_all
        .iter()
        .filter_map(|name| gate_check(name, categories))
        .collect();
    if !misses.is_empty() {
        return Some(FilterReason::GateFailed {
            gate: GateKind::RequireAll,
            misses,
        });
    }

    if !rules.require_any.is_empty() {
        let misses: Vec<GateMiss> = rules
            .require_any
            .iter()
            .filter_map(|name| gate_check(name, categories))
            .collect();
        if misses.len() == rules.require_any.len() {
            return Some(FilterReason::GateFailed {
                gate: GateKind::RequireAny,
                misses,
            });
        }
    }
    None
}
