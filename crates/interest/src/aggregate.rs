//! Combining per-category scores into one interest score.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default multiplier applied to unmatched categories in [`AggregationMode::Max`].
pub const DEFAULT_MAX_PENALTY: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// `sqrt(Σ(w·s²) / Σw)`; one strong signal is not drowned by quiet ones.
    #[default]
    Rms,
    /// `Σ(w·s) / Σw`.
    Linear,
    /// Highest (penalized) score, weights ignored.
    Max,
}

impl AggregationMode {
    pub const NAMES: [&'static str; 3] = ["rms", "linear", "max"];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMode::Rms => "rms",
            AggregationMode::Linear => "linear",
            AggregationMode::Max => "max",
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rms" | "weighted_rms" => Ok(AggregationMode::Rms),
            "linear" | "weighted_linear" => Ok(AggregationMode::Linear),
            "max" => Ok(AggregationMode::Max),
            other => Err(format!("unknown aggregation mode '{other}'")),
        }
    }
}

/// One enabled category's contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScore {
    pub weight: f64,
    pub score: f64,
    pub matched: bool,
}

/// Aggregate scores; result is always in `[0, 1]`.
///
/// Entries with non-positive weight are ignored. No positive weight at all
/// yields exactly 0.
pub fn aggregate(mode: AggregationMode, entries: &[WeightedScore], max_penalty: f64) -> f64 {
    let active = entries
        .iter()
        .filter(|e| e.weight > 0.0 && e.weight.is_finite());

    let value = match mode {
        AggregationMode::Rms => {
            let (num, den) = active.fold((0.0, 0.0), |(n, d), e| {
                let s = clamp_unit(e.score);
                (n + e.weight * s * s, d + e.weight)
            });
            if den > 0.0 {
                (num / den).sqrt()
            } else {
                0.0
            }
        }
        AggregationMode::Linear => {
            let (num, den) = active.fold((0.0, 0.0), |(n, d), e| {
                (n + e.weight * clamp_unit(e.score), d + e.weight)
            });
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        AggregationMode::Max => active
            .map(|e| {
                let s = clamp_unit(e.score);
                if e.matched {
                    s
                } else {
                    s * clamp_unit(max_penalty)
                }
            })
            .fold(0.0, f64::max),
    };
    clamp_unit(value)
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
