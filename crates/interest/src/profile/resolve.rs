//! Preset + profile resolution with collected validation.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, warn};

use crate::aggregate::{AggregationMode, DEFAULT_MAX_PENALTY};
use crate::category::Category;
use crate::engine::InterestEngine;
use crate::error::{ConfigError, Result};
use crate::presets::{PresetRegistry, DEFAULT_PRESET};
use crate::signals::SignalSet;
use crate::validation::{fuzzy_match, ValidationResult};

use super::{InterestProfile, ProfileDocument, RulesConfig, Thresholds, DEFAULT_DETAIL_UPPER_BOUND};

/// A resolved profile together with everything validation found.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub profile: InterestProfile,
    pub validation: ValidationResult,
}

impl ResolvedProfile {
    /// The profile, or [`ConfigError::Invalid`] listing every error.
    pub fn into_valid(self) -> Result<InterestProfile> {
        if self.validation.valid {
            Ok(self.profile)
        } else {
            Err(ConfigError::Invalid {
                errors: self.validation.error_messages(),
            })
        }
    }
}

/// Read and resolve a profile YAML file.
pub fn load_profile(
    path: &Path,
    presets: &PresetRegistry,
    engine: &InterestEngine,
) -> Result<ResolvedProfile> {
    let text = std::fs::read_to_string(path)?;
    let resolved = parse_profile(&text, presets, engine)?;
    debug!(
        path = %path.display(),
        profile = %resolved.profile.name,
        preset = %resolved.profile.preset,
        errors = resolved.validation.errors.len(),
        warnings = resolved.validation.warnings.len(),
        "resolved interest profile"
    );
    Ok(resolved)
}

pub fn parse_profile(
    yaml: &str,
    presets: &PresetRegistry,
    engine: &InterestEngine,
) -> Result<ResolvedProfile> {
    let doc: ProfileDocument = serde_yaml::from_str(yaml)?;
    Ok(resolve_profile(&doc, presets, engine))
}

/// Validation only; same checks as [`resolve_profile`].
pub fn validate_profile(
    doc: &ProfileDocument,
    presets: &PresetRegistry,
    engine: &InterestEngine,
) -> ValidationResult {
    resolve_profile(doc, presets, engine).validation
}

/// Resolve `doc` against its preset.
///
/// Never fails: every problem is recorded in the returned validation result
/// and the offending setting falls back to the preset or built-in default.
///
/// Layering: preset weights, then relative adjustments, then explicit
/// weights. A category's signal config in the profile replaces the preset's
/// for that category. Rule lists concatenate; thresholds, aggregation and
/// the numeric knobs take the profile's value when given.
pub fn resolve_profile(
    doc: &ProfileDocument,
    presets: &PresetRegistry,
    engine: &InterestEngine,
) -> ResolvedProfile {
    let mut v = ValidationResult::new();

    for key in doc.extra.keys() {
        match fuzzy_match(key, &ProfileDocument::KEYS) {
            Some(s) => v.warn(key.as_str(), format!("unknown profile key (did you mean '{s}'?)")),
            None => v.warn(key.as_str(), "unknown profile key"),
        }
    }
    if doc.base.is_some() {
        v.warn("base", "'base' only applies inside preset files; use 'preset' instead");
    }

    let preset_name = doc.preset.clone().unwrap_or_else(|| DEFAULT_PRESET.to_string());
    let preset = load_preset_document(&preset_name, presets, &mut v);

    // ── Weights ─────────────────────────────────────────────────────
    let mut weights = BTreeMap::new();
    collect_weights(&preset.weights, "preset.weights", &mut weights, &mut v);
    apply_adjustments(&preset.adjustments, "preset.adjustments", &mut weights, &mut v);
    apply_adjustments(&doc.adjustments, "adjustments", &mut weights, &mut v);
    collect_weights(&doc.weights, "weights", &mut weights, &mut v);

    // ── Signals ─────────────────────────────────────────────────────
    let mut raw_signals: BTreeMap<Category, (String, Value)> = BTreeMap::new();
    for (prefix, layer) in [("preset.signals", &preset.signals), ("signals", &doc.signals)] {
        for (name, raw) in layer {
            let path = format!("{prefix}.{name}");
            match name.parse::<Category>() {
                Ok(cat) => {
                    raw_signals.insert(cat, (path, raw.clone()));
                }
                Err(e) => v.error_with_suggestion(path, e, fuzzy_match(name, &Category::names())),
            }
        }
    }
    let mut signals = SignalSet::default();
    for (cat, (path, raw)) in raw_signals {
        if let Err(e) = signals.set_from_value(cat, raw) {
            v.error(path, format!("invalid {cat} signal config: {e}"));
        }
    }
    for (_, scorer) in engine.scorers().iter() {
        scorer.validate(&signals, &mut v);
    }
    for cat in Category::ALL {
        if weights.get(&cat).is_some_and(|w| *w > 0.0) && !signals.is_configured(cat) {
            v.warn(format!("signals.{cat}"), "category is weighted but not configured; it scores 0");
        }
    }

    // ── Rules ───────────────────────────────────────────────────────
    let rules = preset
        .rules
        .clone()
        .unwrap_or_default()
        .layered(doc.rules.clone().unwrap_or_default());
    validate_rules(&rules, &weights, engine, &mut v);

    // ── Thresholds and knobs ────────────────────────────────────────
    let thresholds = doc.thresholds.or(preset.thresholds).unwrap_or_default();
    let thresholds = if check_thresholds(&thresholds, &mut v) {
        thresholds
    } else {
        Thresholds::default()
    };

    let aggregation = match doc.aggregation.as_deref().or(preset.aggregation.as_deref()) {
        None => AggregationMode::default(),
        Some(raw) => raw.parse().unwrap_or_else(|e: String| {
            v.error_with_suggestion("aggregation", e, fuzzy_match(raw, &AggregationMode::NAMES));
            AggregationMode::default()
        }),
    };

    let max_penalty = unit_knob(
        "max_penalty",
        doc.max_penalty.or(preset.max_penalty),
        DEFAULT_MAX_PENALTY,
        &mut v,
    );
    let detail_upper_bound = unit_knob(
        "detail_upper_bound",
        doc.detail_upper_bound.or(preset.detail_upper_bound),
        DEFAULT_DETAIL_UPPER_BOUND,
        &mut v,
    );

    let profile = InterestProfile {
        name: doc.name.clone().unwrap_or_else(|| preset_name.clone()),
        preset: preset_name,
        weights,
        signals,
        rules,
        thresholds,
        aggregation,
        max_penalty,
        detail_upper_bound,
    };

    if !v.valid {
        warn!(
            profile = %profile.name,
            errors = v.errors.len(),
            "interest profile has validation errors"
        );
    }

    ResolvedProfile {
        profile,
        validation: v,
    }
}

fn load_preset_document(
    name: &str,
    presets: &PresetRegistry,
    v: &mut ValidationResult,
) -> ProfileDocument {
    let value = match presets.resolve(name) {
        Ok(value) => value,
        Err(ConfigError::UnknownPreset { name, suggestion }) => {
            v.error_with_suggestion("preset", format!("unknown preset '{name}'"), suggestion.as_deref());
            return ProfileDocument::default();
        }
        Err(e) => {
            v.error("preset", e.to_string());
            return ProfileDocument::default();
        }
    };
    match serde_yaml::from_value(value) {
        Ok(doc) => doc,
        Err(e) => {
            v.error("preset", format!("preset '{name}' is malformed: {e}"));
            ProfileDocument::default()
        }
    }
}

fn collect_weights(
    raw: &BTreeMap<String, Value>,
    prefix: &str,
    weights: &mut BTreeMap<Category, f64>,
    v: &mut ValidationResult,
) {
    for (name, value) in raw {
        let path = format!("{prefix}.{name}");
        let cat = match name.parse::<Category>() {
            Ok(c) => c,
            Err(e) => {
                v.error_with_suggestion(path, e, fuzzy_match(name, &Category::names()));
                continue;
            }
        };
        match value.as_f64() {
            Some(w) if w.is_finite() && w >= 0.0 => {
                weights.insert(cat, w);
            }
            Some(w) => v.error(path, format!("weight must be a non-negative number, got {w}")),
            None => v.error(path, "weight must be a number"),
        }
    }
}

/// Parse `"+20%"` / `"-50%"` into a multiplier (1.2 / 0.5).
pub(crate) fn parse_adjustment(raw: &str) -> std::result::Result<f64, String> {
    let s = raw.trim();
    let body = s
        .strip_suffix('%')
        .ok_or_else(|| format!("'{raw}' must end with '%'"))?;
    let (sign, digits) = match body.chars().next() {
        Some('+') => (1.0, &body[1..]),
        Some('-') => (-1.0, &body[1..]),
        _ => return Err(format!("'{raw}' must start with '+' or '-'")),
    };
    let pct: f64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a percentage"))?;
    if !pct.is_finite() || pct < 0.0 {
        return Err(format!("'{raw}' is not a percentage"));
    }
    let factor = 1.0 + sign * pct / 100.0;
    if factor < 0.0 {
        return Err(format!("'{raw}' would make the weight negative"));
    }
    Ok(factor)
}

fn apply_adjustments(
    raw: &BTreeMap<String, Value>,
    prefix: &str,
    weights: &mut BTreeMap<Category, f64>,
    v: &mut ValidationResult,
) {
    for (name, value) in raw {
        let path = format!("{prefix}.{name}");
        let cat = match name.parse::<Category>() {
            Ok(c) => c,
            Err(e) => {
                v.error_with_suggestion(path, e, fuzzy_match(name, &Category::names()));
                continue;
            }
        };
        let Some(text) = value.as_str() else {
            v.error(path, "adjustment must be a string like \"+20%\"");
            continue;
        };
        match parse_adjustment(text) {
            Ok(factor) => match weights.get_mut(&cat) {
                Some(w) => *w *= factor,
                None => v.warn(path, "adjusting a category with no base weight has no effect"),
            },
            Err(e) => v.error(path, e),
        }
    }
}

fn validate_rules(
    rules: &RulesConfig,
    weights: &BTreeMap<Category, f64>,
    engine: &InterestEngine,
    v: &mut ValidationResult,
) {
    let registry = engine.rules();
    let names = registry.names();

    for (list, entries) in [
        ("always_notify", &rules.always_notify),
        ("always_ignore", &rules.always_ignore),
    ] {
        for (i, name) in entries.iter().enumerate() {
            if !registry.contains(name) {
                v.error_with_suggestion(
                    format!("rules.{list}[{i}]"),
                    format!("unknown rule '{name}'"),
                    fuzzy_match(name, &names),
                );
            }
        }
    }

    for name in &rules.always_notify {
        if rules.always_ignore.contains(name) {
            v.error(
                "rules",
                format!("rule '{name}' is in both always_notify and always_ignore"),
            );
        }
    }

    for (gate, entries) in [("require_all", &rules.require_all), ("require_any", &rules.require_any)] {
        for (i, name) in entries.iter().enumerate() {
            let path = format!("rules.{gate}[{i}]");
            match name.parse::<Category>() {
                Ok(cat) if weights.get(&cat).is_some_and(|w| *w > 0.0) => {}
                Ok(cat) => v.warn(path, format!("gate on disabled category '{cat}' never passes")),
                Err(e) => v.error_with_suggestion(path, e, fuzzy_match(name, &Category::names())),
            }
        }
    }

    for rule in registry.iter() {
        rule.validate(&rules.params, v);
    }
}

fn check_thresholds(t: &Thresholds, v: &mut ValidationResult) -> bool {
    let mut ok = true;
    for (name, value) in [("digest", t.digest), ("notify", t.notify), ("priority", t.priority)] {
        if !(0.0..=1.0).contains(&value) {
            v.error(format!("thresholds.{name}"), format!("{value} is outside [0, 1]"));
            ok = false;
        }
    }
    if !(t.digest <= t.notify && t.notify <= t.priority) {
        v.error(
            "thresholds",
            format!(
                "must satisfy digest <= notify <= priority (got {} / {} / {})",
                t.digest, t.notify, t.priority
            ),
        );
        ok = false;
    }
    ok
}

fn unit_knob(name: &str, value: Option<f64>, default: f64, v: &mut ValidationResult) -> f64 {
    match value {
        None => default,
        Some(x) if (0.0..=1.0).contains(&x) => x,
        Some(x) => {
            v.error(name, format!("{x} is outside [0, 1]"));
            default
        }
    }
}
