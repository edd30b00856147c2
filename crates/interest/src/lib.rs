//! Interest engine: decides whether a kill deserves a notification.
//!
//! `evaluate(kill, context, profile)` is a pure function producing an
//! [`InterestResult`] with an aggregate score, a per-category breakdown and a
//! [`Tier`](killwatch_core::Tier). Profiles come from YAML, layered on top of
//! named presets and validated at load time.

pub mod aggregate;
pub mod category;
pub mod context;
pub mod engine;
pub mod error;
pub mod presets;
pub mod profile;
pub mod result;
pub mod rules;
pub mod signals;
pub mod validation;

#[cfg(test)]
mod tests;

pub use aggregate::{aggregate, AggregationMode, WeightedScore};
pub use category::Category;
pub use context::{EvaluationContext, JumpDistance, JumpTable, NoJumpData};
pub use engine::{calculate_prefetch_bounds, evaluate, InterestEngine};
pub use error::{ConfigError, Result};
pub use presets::{PresetRegistry, DEFAULT_PRESET};
pub use profile::{
    load_profile, parse_profile, resolve_profile, validate_profile, InterestProfile,
    ProfileDocument, ResolvedProfile, RulesConfig, Thresholds,
};
pub use result::{
    CategoryBreakdown, CategoryStatus, FilterReason, GateFailure, GateKind, GateMiss,
    InterestResult, PrefetchBounds,
};
pub use rules::{Rule, RuleRegistry};
pub use signals::{CategoryScorer, ScorerRegistry, SignalScore, SignalSet};
pub use validation::ValidationResult;
