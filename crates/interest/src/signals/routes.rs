use serde::{Deserialize, Serialize};

use killwatch_core::{Killmail, SystemId};

use super::{CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedRoute {
    pub name: String,
    pub systems: Vec<SystemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutesSignal {
    #[serde(default)]
    pub routes: Vec<NamedRoute>,
}

pub struct RoutesScorer;

impl CategoryScorer for RoutesScorer {
    fn category(&self) -> Category {
        Category::Routes
    }

    fn evaluate(&self, kill: &Killmail, _ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.routes.as_ref()?;
        let route = signal
            .routes
            .iter()
            .find(|r| r.systems.contains(&kill.solar_system_id));
        Some(match route {
            Some(r) => SignalScore::hit(1.0).with_note(r.name.clone()),
            None => SignalScore::miss(),
        })
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        let Some(signal) = &signals.routes else {
            return;
        };
        for (i, r) in signal.routes.iter().enumerate() {
            if r.systems.is_empty() {
                result.warn(format!("signals.routes.routes[{i}]"), format!("route '{}' has no systems", r.name));
            }
        }
    }
}
