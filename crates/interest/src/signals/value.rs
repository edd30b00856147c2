use serde::{Deserialize, Serialize};

use killwatch_core::Killmail;

use super::{CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

/// Log-scaled ISK value band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueSignal {
    /// Scores 0 and starts matching here.
    pub floor: f64,
    /// Scores 1.0 at and above.
    pub ceiling: f64,
}

pub struct ValueScorer;

impl ValueScorer {
    fn score(value: f64, floor: f64, ceiling: f64) -> SignalScore {
        if !(value >= floor) || floor <= 0.0 {
            return SignalScore::miss();
        }
        if value >= ceiling || ceiling <= floor {
            return SignalScore::hit(1.0);
        }
        SignalScore::hit((value / floor).ln() / (ceiling / floor).ln())
    }
}

impl CategoryScorer for ValueScorer {
    fn category(&self) -> Category {
        Category::Value
    }

    fn evaluate(&self, kill: &Killmail, _ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.value.as_ref()?;
        Some(Self::score(kill.total_value, signal.floor, signal.ceiling))
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        let Some(signal) = &signals.value else {
            return;
        };
        if !(signal.floor > 0.0) || !signal.floor.is_finite() {
            result.error("signals.value.floor", "floor must be a positive number");
        }
        if !(signal.ceiling > signal.floor) || !signal.ceiling.is_finite() {
            result.error("signals.value.ceiling", "ceiling must be greater than floor");
        }
    }
}
