use serde::{Deserialize, Serialize};

use killwatch_core::{Killmail, SystemId};

use super::{proximity, CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetLocation {
    pub system_id: SystemId,
    pub label: String,
    #[serde(default)]
    pub range: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetsSignal {
    #[serde(default)]
    pub assets: Vec<AssetLocation>,
}

pub struct AssetsScorer;

impl CategoryScorer for AssetsScorer {
    fn category(&self) -> Category {
        Category::Assets
    }

    fn evaluate(&self, kill: &Killmail, ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.assets.as_ref()?;
        let best = signal
            .assets
            .iter()
            .map(|a| (a, proximity(ctx.jumps.as_ref(), a.system_id, kill.solar_system_id, a.range)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        Some(match best {
            Some((asset, score)) if score > 0.0 => SignalScore::hit(score).with_note(asset.label.clone()),
            _ => SignalScore::miss(),
        })
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        let Some(signal) = &signals.assets else {
            return;
        };
        for (i, a) in signal.assets.iter().enumerate() {
            if a.label.trim().is_empty() {
                result.warn(format!("signals.assets.assets[{i}].label"), "empty asset label");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::JumpTable;
    use crate::signals::test_support::sample_kill;

    #[test]
    fn nearest_asset_wins() {
        let kill = sample_kill();
        let table = JumpTable::new()
            .with(1, kill.solar_system_id, 1)
            .with(2, kill.solar_system_id, 4);
        let ctx = EvaluationContext::new(kill.kill_time).with_jumps(Arc::new(table));
        let signals = SignalSet {
            assets: Some(AssetsSignal {
                assets: vec![
                    AssetLocation {
                        system_id: 2,
                        label: "Far citadel".into(),
                        range: 5,
                    },
                    AssetLocation {
                        system_id: 1,
                        label: "Staging".into(),
                        range: 1,
                    },
                ],
            }),
            ..Default::default()
        };
        let scored = AssetsScorer.evaluate(&kill, &ctx, &signals).unwrap();
        // Far citadel: 1 - 4/6 = 0.333; staging: 1 - 1/2 = 0.5.
        assert_eq!(scored.note.as_deref(), Some("Staging"));
        assert!((scored.score - 0.5).abs() < 1e-9);
    }
}
