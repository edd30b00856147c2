//! Interest profiles: the raw YAML document and its resolved form.

mod resolve;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use killwatch_core::Tier;

use crate::aggregate::{AggregationMode, DEFAULT_MAX_PENALTY};
use crate::category::Category;
use crate::signals::SignalSet;

pub use resolve::{load_profile, parse_profile, resolve_profile, validate_profile, ResolvedProfile};

/// Upper-bound score assumed for a category still waiting on detail.
pub const DEFAULT_DETAIL_UPPER_BOUND: f64 = 1.0;

/// Score cut-offs, each in `[0, 1]` with `digest <= notify <= priority`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    pub digest: f64,
    pub notify: f64,
    pub priority: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            digest: 0.3,
            notify: 0.5,
            priority: 0.8,
        }
    }
}

impl Thresholds {
    pub fn tier_for(&self, score: f64) -> Tier {
        if score >= self.priority {
            Tier::Priority
        } else if score >= self.notify {
            Tier::Notify
        } else if score >= self.digest {
            Tier::Digest
        } else {
            Tier::Filter
        }
    }
}

/// Rule references and gates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesConfig {
    pub always_notify: Vec<String>,
    pub always_ignore: Vec<String>,
    /// Every listed category must be enabled and matched.
    pub require_all: Vec<String>,
    /// At least one listed category must be enabled and matched.
    pub require_any: Vec<String>,
    /// Numeric rule parameters, e.g. `high_value_isk`.
    pub params: BTreeMap<String, f64>,
}

impl RulesConfig {
    /// Layer `child` over `self`: rule lists concatenate without duplicates,
    /// non-empty gates replace, params merge key by key.
    pub fn layered(mut self, child: RulesConfig) -> RulesConfig {
        for name in child.always_notify {
            if !self.always_notify.contains(&name) {
                self.always_notify.push(name);
            }
        }
        for name in child.always_ignore {
            if !self.always_ignore.contains(&name) {
                self.always_ignore.push(name);
            }
        }
        if !child.require_all.is_empty() {
            self.require_all = child.require_all;
        }
        if !child.require_any.is_empty() {
            self.require_any = child.require_any;
        }
        self.params.extend(child.params);
        self
    }
}

/// Profile as written in YAML. Loosely typed so validation can report every
/// problem instead of failing on the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDocument {
    pub name: Option<String>,
    pub description: Option<String>,
    pub preset: Option<String>,
    /// Only meaningful in preset files.
    pub base: Option<String>,
    /// Relative weight changes such as `"+20%"` or `"-50%"`.
    pub adjustments: BTreeMap<String, serde_yaml::Value>,
    pub weights: BTreeMap<String, serde_yaml::Value>,
    pub signals: BTreeMap<String, serde_yaml::Value>,
    pub rules: Option<RulesConfig>,
    pub thresholds: Option<Thresholds>,
    pub aggregation: Option<String>,
    pub max_penalty: Option<f64>,
    pub detail_upper_bound: Option<f64>,
    #[serde(flatten, skip_serializing)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ProfileDocument {
    pub const KEYS: [&'static str; 12] = [
        "name",
        "description",
        "preset",
        "base",
        "adjustments",
        "weights",
        "signals",
        "rules",
        "thresholds",
        "aggregation",
        "max_penalty",
        "detail_upper_bound",
    ];

    /// Profile that only names a preset.
    pub fn from_preset(preset: impl Into<String>) -> Self {
        Self {
            preset: Some(preset.into()),
            ..Self::default()
        }
    }
}

/// Fully resolved profile consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestProfile {
    pub name: String,
    pub preset: String,
    pub weights: BTreeMap<Category, f64>,
    pub signals: SignalSet,
    pub rules: RulesConfig,
    pub thresholds: Thresholds,
    pub aggregation: AggregationMode,
    /// Multiplier for unmatched categories in max aggregation.
    pub max_penalty: f64,
    pub detail_upper_bound: f64,
}

impl Default for InterestProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            preset: String::new(),
            weights: BTreeMap::new(),
            signals: SignalSet::default(),
            rules: RulesConfig::default(),
            thresholds: Thresholds::default(),
            aggregation: AggregationMode::default(),
            max_penalty: DEFAULT_MAX_PENALTY,
            detail_upper_bound: DEFAULT_DETAIL_UPPER_BOUND,
        }
    }
}

impl InterestProfile {
    pub fn weight(&self, category: Category) -> f64 {
        self.weights.get(&category).copied().unwrap_or(0.0)
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        self.weight(category) > 0.0
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.rules.params.get(name).copied()
    }
}
