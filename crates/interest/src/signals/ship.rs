use serde::{Deserialize, Serialize};

use killwatch_core::{EntityId, Killmail};

use super::{CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShipSignal {
    pub victim_types: Vec<EntityId>,
    pub attacker_types: Vec<EntityId>,
    /// Score when only an attacker ship type matches.
    pub attacker_score: f64,
    pub exclude_pods: bool,
}

impl Default for ShipSignal {
    fn default() -> Self {
        Self {
            victim_types: Vec::new(),
            attacker_types: Vec::new(),
            attacker_score: 0.6,
            exclude_pods: false,
        }
    }
}

pub struct ShipScorer;

impl CategoryScorer for ShipScorer {
    fn category(&self) -> Category {
        Category::Ship
    }

    fn evaluate(&self, kill: &Killmail, _ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.ship.as_ref()?;
        if signal.exclude_pods && kill.is_pod_kill {
            return Some(SignalScore::miss());
        }
        if signal.victim_types.contains(&kill.victim_ship_type_id) {
            return Some(SignalScore::hit(1.0).with_note("watched victim hull"));
        }
        if kill
            .attackers
            .ship_type_ids
            .iter()
            .any(|s| signal.attacker_types.contains(s))
        {
            return Some(SignalScore::hit(signal.attacker_score).with_note("watched attacker hull"));
        }
        Some(SignalScore::miss())
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        let Some(signal) = &signals.ship else {
            return;
        };
        if !(0.0..=1.0).contains(&signal.attacker_score) {
            result.error("signals.ship.attacker_score", "must be within [0, 1]");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::sample_kill;

    #[test]
    fn victim_then_attacker_then_pod_exclusion() {
        let mut kill = sample_kill();
        let ctx = EvaluationContext::new(kill.kill_time);
        let mut signals = SignalSet {
            ship: Some(ShipSignal {
                victim_types: vec![24698],
                attacker_types: vec![29990],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(ShipScorer.evaluate(&kill, &ctx, &signals).unwrap().score, 1.0);

        signals.ship.as_mut().unwrap().victim_types.clear();
        assert_eq!(ShipScorer.evaluate(&kill, &ctx, &signals).unwrap().score, 0.6);

        kill.is_pod_kill = true;
        signals.ship.as_mut().unwrap().exclude_pods = true;
        assert!(!ShipScorer.evaluate(&kill, &ctx, &signals).unwrap().matched);
    }
}
