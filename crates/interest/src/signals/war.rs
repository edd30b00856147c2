use serde::{Deserialize, Serialize};

use killwatch_core::{EntityId, Killmail};

use super::{CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarSignal {
    /// Entities whose wars score 1.0.
    pub watched: Vec<EntityId>,
    /// Score for any other active war.
    pub other_war_score: f64,
    pub authoritative_bonus: f64,
}

impl Default for WarSignal {
    fn default() -> Self {
        Self {
            watched: Vec::new(),
            other_war_score: 0.3,
            authoritative_bonus: 0.2,
        }
    }
}

impl WarSignal {
    pub fn watches_relationship(&self, low: EntityId, high: EntityId) -> bool {
        self.watched.contains(&low) || self.watched.contains(&high)
    }
}

pub struct WarScorer;

impl CategoryScorer for WarScorer {
    fn category(&self) -> Category {
        Category::War
    }

    fn evaluate(&self, _kill: &Killmail, ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.war.as_ref()?;
        let Some(rel) = ctx.war.as_ref().and_then(|w| w.relationship.as_ref()) else {
            return Some(SignalScore::miss());
        };
        if !rel.is_active(ctx.now) {
            return Some(SignalScore::miss());
        }

        let watched = signal.watches_relationship(rel.pair.low, rel.pair.high);
        let mut score = if watched { 1.0 } else { signal.other_war_score };
        if rel.is_authoritative() {
            score += signal.authoritative_bonus;
        }
        let note = format!("war {} vs {}", rel.pair.low, rel.pair.high);
        Some(SignalScore::new(score, watched || score > 0.0).with_note(note))
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        let Some(signal) = &signals.war else {
            return;
        };
        if !(0.0..=1.0).contains(&signal.other_war_score) {
            result.error("signals.war.other_war_score", "must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&signal.authoritative_bonus) {
            result.error("signals.war.authoritative_bonus", "must be within [0, 1]");
        }
    }
}
