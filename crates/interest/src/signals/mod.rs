//! Category scorers and their signal configuration.
//!
//! Each category has a typed signal config in [`SignalSet`] and a
//! [`CategoryScorer`] that turns a kill plus context into a [`SignalScore`].
//! Scorers live in a [`ScorerRegistry`] keyed by category, so a custom
//! implementation can replace a built-in one.

mod activity;
mod assets;
mod location;
mod politics;
mod routes;
mod ship;
mod time;
mod value;
mod war;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use killwatch_core::Killmail;

use crate::category::Category;
use crate::context::{EvaluationContext, JumpDistance};
use crate::validation::ValidationResult;

pub use activity::{ActivityScorer, ActivitySignal, AmbushScores};
pub use assets::{AssetLocation, AssetsScorer, AssetsSignal};
pub use location::{LocationScorer, LocationSignal, WatchedSystem};
pub use politics::{PoliticsScorer, PoliticsSignal};
pub use routes::{NamedRoute, RoutesScorer, RoutesSignal};
pub use ship::{ShipScorer, ShipSignal};
pub use time::{HourWindow, TimeScorer, TimeSignal};
pub use value::{ValueScorer, ValueSignal};
pub use war::{WarScorer, WarSignal};

/// Output of one scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    /// In `[0, 1]`.
    pub score: f64,
    pub matched: bool,
    /// Short human-readable explanation, e.g. the matched route name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SignalScore {
    pub fn new(score: f64, matched: bool) -> Self {
        Self {
            score: if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) },
            matched,
            note: None,
        }
    }

    pub fn hit(score: f64) -> Self {
        Self::new(score, true)
    }

    pub fn miss() -> Self {
        Self::new(0.0, false)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Per-category signal configuration. `None` means "not configured".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub politics: Option<PoliticsSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<ActivitySignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<RoutesSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<AssetsSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub war: Option<WarSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship: Option<ShipSignal>,
}

impl SignalSet {
    /// Parse one category's raw YAML into its typed slot.
    pub fn set_from_value(
        &mut self,
        category: Category,
        raw: serde_yaml::Value,
    ) -> Result<(), serde_yaml::Error> {
        match category {
            Category::Location => self.location = Some(serde_yaml::from_value(raw)?),
            Category::Value => self.value = Some(serde_yaml::from_value(raw)?),
            Category::Politics => self.politics = Some(serde_yaml::from_value(raw)?),
            Category::Activity => self.activity = Some(serde_yaml::from_value(raw)?),
            Category::Time => self.time = Some(serde_yaml::from_value(raw)?),
            Category::Routes => self.routes = Some(serde_yaml::from_value(raw)?),
            Category::Assets => self.assets = Some(serde_yaml::from_value(raw)?),
            Category::War => self.war = Some(serde_yaml::from_value(raw)?),
            Category::Ship => self.ship = Some(serde_yaml::from_value(raw)?),
        }
        Ok(())
    }

    pub fn is_configured(&self, category: Category) -> bool {
        match category {
            Category::Location => self.location.is_some(),
            Category::Value => self.value.is_some(),
            Category::Politics => self.politics.is_some(),
            Category::Activity => self.activity.is_some(),
            Category::Time => self.time.is_some(),
            Category::Routes => self.routes.is_some(),
            Category::Assets => self.assets.is_some(),
            Category::War => self.war.is_some(),
            Category::Ship => self.ship.is_some(),
        }
    }
}

/// Scores one category.
pub trait CategoryScorer: Send + Sync {
    fn category(&self) -> Category;

    /// Score `kill`. Returns `None` when `signals` has nothing configured for
    /// this category.
    fn evaluate(
        &self,
        kill: &Killmail,
        ctx: &EvaluationContext,
        signals: &SignalSet,
    ) -> Option<SignalScore>;

    /// Whether the final score can be computed without enrichment detail.
    fn prefetch_capable(&self, _signals: &SignalSet) -> bool {
        true
    }

    /// Semantic checks on this category's signal config.
    fn validate(&self, _signals: &SignalSet, _result: &mut ValidationResult) {}
}

/// Category → scorer table.
#[derive(Clone)]
pub struct ScorerRegistry {
    scorers: BTreeMap<Category, Arc<dyn CategoryScorer>>,
}

impl std::fmt::Debug for ScorerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.scorers.keys()).finish()
    }
}

impl Default for ScorerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ScorerRegistry {
    pub fn empty() -> Self {
        Self {
            scorers: BTreeMap::new(),
        }
    }

    /// Registry with a built-in scorer for every category.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register(Arc::new(LocationScorer));
        reg.register(Arc::new(ValueScorer));
        reg.register(Arc::new(PoliticsScorer));
        reg.register(Arc::new(ActivityScorer));
        reg.register(Arc::new(TimeScorer));
        reg.register(Arc::new(RoutesScorer));
        reg.register(Arc::new(AssetsScorer));
        reg.register(Arc::new(WarScorer));
        reg.register(Arc::new(ShipScorer));
        reg
    }

    /// Register `scorer`, replacing any existing scorer for its category.
    pub fn register(&mut self, scorer: Arc<dyn CategoryScorer>) {
        self.scorers.insert(scorer.category(), scorer);
    }

    pub fn get(&self, category: Category) -> Option<&Arc<dyn CategoryScorer>> {
        self.scorers.get(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Category, &Arc<dyn CategoryScorer>)> {
        self.scorers.iter()
    }
}

/// Linear decay with jump distance: 1.0 at the system itself, dropping by
/// `1 / (range + 1)` per jump, 0 beyond `range`.
pub(crate) fn proximity(
    jumps: &dyn JumpDistance,
    from: killwatch_core::SystemId,
    to: killwatch_core::SystemId,
    range: u32,
) -> f64 {
    match jumps.jumps(from, to) {
        Some(0) => 1.0,
        Some(j) if j <= range => 1.0 - f64::from(j) / f64::from(range + 1),
        _ => 0.0,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};
    use killwatch_core::{AttackerSummary, Killmail};

    pub fn sample_kill() -> Killmail {
        Killmail {
            kill_id: 1,
            kill_time: Utc.with_ymd_and_hms(2026, 4, 2, 19, 30, 0).unwrap(),
            solar_system_id: 30002187,
            victim_ship_type_id: 24698,
            victim_corporation_id: Some(98_000_001),
            victim_alliance_id: Some(99_000_001),
            attackers: AttackerSummary {
                count: 6,
                corporation_ids: BTreeSet::from([98_000_500]),
                alliance_ids: BTreeSet::from([99_000_500]),
                ship_type_ids: BTreeSet::from([11993, 29990]),
            },
            final_blow_ship_type_id: Some(29990),
            total_value: 2.5e8,
            is_pod_kill: false,
            hash: "deadbeef".into(),
        }
    }
}
