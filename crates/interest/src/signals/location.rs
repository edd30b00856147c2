use serde::{Deserialize, Serialize};

use killwatch_core::{Killmail, SystemId};

use super::{proximity, CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchedSystem {
    pub system_id: SystemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Jump radius around the system; 0 means the system only.
    #[serde(default)]
    pub range: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationSignal {
    #[serde(default)]
    pub systems: Vec<WatchedSystem>,
}

/// Watched systems, exact or within a jump range.
pub struct LocationScorer;

impl CategoryScorer for LocationScorer {
    fn category(&self) -> Category {
        Category::Location
    }

    fn evaluate(&self, kill: &Killmail, ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.location.as_ref()?;
        let best = signal
            .systems
            .iter()
            .map(|w| (w, proximity(ctx.jumps.as_ref(), w.system_id, kill.solar_system_id, w.range)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        Some(match best {
            Some((w, score)) if score > 0.0 => {
                let label = w.name.clone().unwrap_or_else(|| w.system_id.to_string());
                SignalScore::hit(score).with_note(label)
            }
            _ => SignalScore::miss(),
        })
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        if let Some(signal) = &signals.location {
            if signal.systems.is_empty() {
                result.warn("signals.location.systems", "no systems configured; location never matches");
            }
        }
    }
}
