use serde::{Deserialize, Serialize};

use killwatch_core::Killmail;
use killwatch_patterns::Confidence;

use super::{CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AmbushScores {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for AmbushScores {
    fn default() -> Self {
        Self {
            low: 0.5,
            medium: 0.75,
            high: 1.0,
        }
    }
}

impl AmbushScores {
    fn for_confidence(&self, confidence: Confidence) -> f64 {
        match confidence {
            Confidence::Low => self.low,
            Confidence::Medium => self.medium,
            Confidence::High => self.high,
        }
    }
}

/// Local kill-rate spikes, overridden by a detected camp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivitySignal {
    /// Recent kills in the system at which the score saturates.
    pub spike_threshold: u32,
    pub ambush: AmbushScores,
}

impl Default for ActivitySignal {
    fn default() -> Self {
        Self {
            spike_threshold: 5,
            ambush: AmbushScores::default(),
        }
    }
}

pub struct ActivityScorer;

impl CategoryScorer for ActivityScorer {
    fn category(&self) -> Category {
        Category::Activity
    }

    fn evaluate(&self, _kill: &Killmail, ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.activity.as_ref()?;

        if let Some(ambush) = &ctx.ambush {
            let score = signal.ambush.for_confidence(ambush.confidence);
            let kind = if ambush.smartbomb { "smartbomb camp" } else { "gate camp" };
            return Some(
                SignalScore::hit(score).with_note(format!("{kind}, {} confidence", ambush.confidence.as_str())),
            );
        }

        let threshold = signal.spike_threshold.max(1);
        let score = (f64::from(ctx.recent_kills) / f64::from(threshold)).min(1.0);
        Some(SignalScore::new(score, ctx.recent_kills >= threshold))
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        let Some(signal) = &signals.activity else {
            return;
        };
        if signal.spike_threshold == 0 {
            result.error("signals.activity.spike_threshold", "spike_threshold must be at least 1");
        }
        for (name, v) in [
            ("low", signal.ambush.low),
            ("medium", signal.ambush.medium),
            ("high", signal.ambush.high),
        ] {
            if !(0.0..=1.0).contains(&v) {
                result.error(format!("signals.activity.ambush.{name}"), "must be within [0, 1]");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::signals::test_support::sample_kill;
    use killwatch_patterns::AmbushAssessment;

    #[test]
    fn spike_scales_then_saturates() {
        let kill = sample_kill();
        let signals = SignalSet {
            activity: Some(ActivitySignal::default()),
            ..Default::default()
        };
        let quiet = EvaluationContext::new(kill.kill_time).with_recent_kills(2);
        let scored = ActivityScorer.evaluate(&kill, &quiet, &signals).unwrap();
        assert!(!scored.matched);
        assert!((scored.score - 0.4).abs() < 1e-9);

        let busy = EvaluationContext::new(kill.kill_time).with_recent_kills(12);
        assert_eq!(ActivityScorer.evaluate(&kill, &busy, &signals).unwrap().score, 1.0);
    }

    #[test]
    fn ambush_overrides_by_confidence() {
        let kill = sample_kill();
        let signals = SignalSet {
            activity: Some(ActivitySignal::default()),
            ..Default::default()
        };
        let ambush = AmbushAssessment {
            system_id: kill.solar_system_id,
            confidence: Confidence::Medium,
            score: 0.5,
            asymmetry: 8.0,
            kill_ids: vec![1, 2, 3],
            victim_corporations: BTreeSet::new(),
            attacker_corporations: BTreeSet::new(),
            attacker_alliances: BTreeSet::new(),
            pod_kills: 0,
            smartbomb: false,
            first_kill: kill.kill_time,
            last_kill: kill.kill_time,
        };
        let ctx = EvaluationContext::new(kill.kill_time)
            .with_recent_kills(0)
            .with_ambush(Some(ambush));
        let scored = ActivityScorer.evaluate(&kill, &ctx, &signals).unwrap();
        assert!(scored.matched);
        assert_eq!(scored.score, 0.75);
    }
}
