//! Named boolean rules used by `always_notify` / `always_ignore`.

mod builtin;

use std::collections::BTreeMap;
use std::sync::Arc;

use killwatch_core::Killmail;

use crate::context::EvaluationContext;
use crate::profile::InterestProfile;
use crate::validation::ValidationResult;

pub use builtin::*;

/// A named predicate over one kill.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, kill: &Killmail, ctx: &EvaluationContext, profile: &InterestProfile) -> bool;

    /// Whether the rule can be decided without enrichment detail.
    fn prefetch_capable(&self) -> bool {
        true
    }

    /// Check the rule's numeric parameters from `rules.params`.
    fn validate(&self, _params: &BTreeMap<String, f64>, _result: &mut ValidationResult) {}
}

/// Name → rule table. Registering a name twice replaces the earlier rule.
#[derive(Clone)]
pub struct RuleRegistry {
    rules: BTreeMap<String, Arc<dyn Rule>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.rules.keys()).finish()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register(Arc::new(PodKill));
        reg.register(Arc::new(NpcOnly));
        reg.register(Arc::new(SoloKill));
        reg.register(Arc::new(LargeFleet));
        reg.register(Arc::new(HighValue));
        reg.register(Arc::new(Gatecamp));
        reg.register(Arc::new(SmartbombCamp));
        reg.register(Arc::new(WarTarget));
        reg.register(Arc::new(WatchedVictim));
        reg.register(Arc::new(WatchedCharacter));
        reg
    }

    pub fn register(&mut self, rule: Arc<dyn Rule>) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.values()
    }
}
