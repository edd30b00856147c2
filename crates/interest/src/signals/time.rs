use chrono::Timelike;
use serde::{Deserialize, Serialize};

use killwatch_core::Killmail;

use super::{CategoryScorer, SignalScore, SignalSet};
use crate::category::Category;
use crate::context::EvaluationContext;
use crate::validation::ValidationResult;

/// UTC hour range `[start, end)`. `start > end` wraps past midnight;
/// `start == end` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    pub fn contains(&self, hour: u32) -> bool {
        match self.start.cmp(&self.end) {
            std::cmp::Ordering::Less => hour >= self.start && hour < self.end,
            std::cmp::Ordering::Greater => hour >= self.start || hour < self.end,
            std::cmp::Ordering::Equal => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSignal {
    #[serde(default)]
    pub windows: Vec<HourWindow>,
    /// Score outside every window.
    #[serde(default)]
    pub off_hours_score: f64,
}

pub struct TimeScorer;

impl CategoryScorer for TimeScorer {
    fn category(&self) -> Category {
        Category::Time
    }

    fn evaluate(&self, kill: &Killmail, _ctx: &EvaluationContext, signals: &SignalSet) -> Option<SignalScore> {
        let signal = signals.time.as_ref()?;
        let hour = kill.kill_time.hour();
        if signal.windows.iter().any(|w| w.contains(hour)) {
            Some(SignalScore::hit(1.0))
        } else {
            Some(SignalScore::new(signal.off_hours_score, false))
        }
    }

    fn validate(&self, signals: &SignalSet, result: &mut ValidationResult) {
        let Some(signal) = &signals.time else {
            return;
        };
        for (i, w) in signal.windows.iter().enumerate() {
            if w.start > 23 || w.end > 24 {
                result.error(
                    format!("signals.time.windows[{i}]"),
                    format!("hours out of range: {}-{}", w.start, w.end),
                );
            }
        }
        if !(0.0..=1.0).contains(&signal.off_hours_score) {
            result.error("signals.time.off_hours_score", "must be within [0, 1]");
        }
    }
}
