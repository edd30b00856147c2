use serde::{Deserialize, Serialize};

use killwatch_core::{EntityId, Killmail};

use super::{CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

fn yes() -> bool {
    true
}

/// Watched corporations, alliances and characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoliticsSignal {
    #[serde(default)]
    pub corporations: Vec<EntityId>,
    #[serde(default)]
    pub alliances: Vec<EntityId>,
    /// Character ids only resolve once enrichment detail is available.
    #[serde(default)]
    pub characters: Vec<EntityId>,
    #[serde(default = "yes")]
    pub victim: bool,
    #[serde(default = "yes")]
    pub attacker: bool,
}

impl PoliticsSignal {
    pub fn watches(&self, id: EntityId) -> bool {
        self.corporations.contains(&id) || self.alliances.contains(&id)
    }

    pub fn victim_watched(&self, kill: &Killmail) -> bool {
        self.victim
            && (kill.victim_corporation_id.is_some_and(|c| self.watches(c))
                || kill.victim_alliance_id.is_some_and(|a| self.watches(a)))
    }

    pub fn attacker_watched(&self, kill: &Killmail) -> bool {
        self.attacker
            && kill
                .attackers
                .corporation_ids
                .iter()
                .chain(kill.attackers.alliance_ids.iter())
                .any(|id| self.watches(*id))
    }
}

pub struct PoliticsScorer;

impl CategoryScorer for PoliticsScorer {
    fn category(&self) -> Category {
        Category::Politics
    }

    fn evaluate(&self, kill: &Killmail, ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.politics.as_ref()?;

        if signal.victim_watched(kill) {
            return Some(SignalScore::hit(1.0).with_note("watched victim"));
        }
        if signal.attacker_watched(kill) {
            return Some(SignalScore::hit(1.0).with_note("watched attacker"));
        }
        if let Some(detail) = ctx.detail() {
            let victim_hit = signal.victim
                && detail
                    .victim_character_id
                    .is_some_and(|c| signal.characters.contains(&c));
            let attacker_hit = signal.attacker
                && detail
                    .attacker_character_ids
                    .iter()
                    .any(|c| signal.characters.contains(c));
            if victim_hit || attacker_hit {
                return Some(SignalScore::hit(1.0).with_note("watched character"));
            }
        }
        Some(SignalScore::miss())
    }

    fn prefetch_capable(&self, signals: &SignalSet) -> bool {
        signals
            .politics
            .as_ref()
            .map_or(true, |s| s.characters.is_empty())
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        let Some(signal) = &signals.politics else {
            return;
        };
        if !signal.victim && !signal.attacker {
            result.warn("signals.politics", "both victim and attacker sides disabled; politics never matches");
        }
        if signal.corporations.is_empty() && signal.alliances.is_empty() && signal.characters.is_empty() {
            result.warn("signals.politics", "no watched entities configured");
        }
    }
}
