//! Engine output types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use killwatch_core::Tier;

use crate::aggregate::AggregationMode;
use crate::category::Category;
use crate::profile::Thresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    /// Weight is zero.
    Disabled,
    /// Weighted, but the profile has no signal config (or no scorer) for it.
    NotConfigured,
    Scored,
    /// Scored from partial data; enrichment detail is still pending.
    AwaitingDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub weight: f64,
    pub score: f64,
    pub matched: bool,
    pub status: CategoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CategoryBreakdown {
    pub(crate) fn inactive(weight: f64, status: CategoryStatus) -> Self {
        Self {
            weight,
            score: 0.0,
            matched: false,
            status,
            note: None,
        }
    }

    /// Counts towards aggregation.
    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    RequireAll,
    RequireAny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailure {
    Disabled,
    NotConfigured,
    NoMatch,
    UnknownCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateMiss {
    pub category: String,
    pub cause: GateFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterReason {
    IgnoredByRule { rule: String },
    GateFailed { gate: GateKind, misses: Vec<GateMiss> },
    BelowThreshold { score: f64, digest: f64 },
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::IgnoredByRule { rule } => write!(f, "ignored by rule '{rule}'"),
            FilterReason::GateFailed { gate, misses } => {
                let gate = match gate {
                    GateKind::RequireAll => "require_all",
                    GateKind::RequireAny => "require_any",
                };
                let detail: Vec<String> = misses
                    .iter()
                    .map(|m| {
                        let cause = match m.cause {
                            GateFailure::Disabled => "disabled",
                            GateFailure::NotConfigured => "not configured",
                            GateFailure::NoMatch => "no match",
                            GateFailure::UnknownCategory => "unknown category",
                        };
                        format!("{} ({cause})", m.category)
                    })
                    .collect();
                write!(f, "{gate} gate failed: {}", detail.join(", "))
            }
            FilterReason::BelowThreshold { score, digest } => {
                write!(f, "score {score:.3} below digest threshold {digest:.3}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestResult {
    /// Aggregate score in `[0, 1]`; 0 when filtered by a rule or gate.
    pub score: f64,
    pub tier: Tier,
    pub categories: BTreeMap<Category, CategoryBreakdown>,
    /// `always_notify` rules that matched (or the `always_ignore` rule that did).
    pub matched_rules: Vec<String>,
    pub thresholds: Thresholds,
    pub aggregation: AggregationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_reason: Option<FilterReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub awaiting_detail: Vec<Category>,
}

impl InterestResult {
    pub fn should_notify(&self) -> bool {
        self.tier.is_notify()
    }

    pub fn is_filtered(&self) -> bool {
        self.tier == Tier::Filter
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.filter_reason, Some(FilterReason::IgnoredByRule { .. }))
    }

    /// Matched categories, strongest first, for message formatting.
    pub fn top_categories(&self) -> Vec<(Category, &CategoryBreakdown)> {
        let mut matched: Vec<_> = self
            .categories
            .iter()
            .filter(|(_, b)| b.matched)
            .map(|(c, b)| (*c, b))
            .collect();
        matched.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        matched
    }
}

/// Score range before enrichment detail is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefetchBounds {
    /// Final aggregate when nothing enabled is waiting on detail.
    pub known: Option<f64>,
    pub lower: f64,
    pub upper: f64,
    pub awaiting_detail: Vec<Category>,
    /// An `always_notify` rule needs detail to be decided.
    pub notify_rule_needs_detail: bool,
}

impl PrefetchBounds {
    /// Whether fetching detail could change the outcome at `notify_threshold`.
    pub fn should_fetch(&self, notify_threshold: f64) -> bool {
        self.notify_rule_needs_detail
            || (!self.awaiting_detail.is_empty() && self.upper >= notify_threshold)
    }
}
