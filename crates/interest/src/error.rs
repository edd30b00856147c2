//! Error types for profile and preset loading.

use std::path::PathBuf;

/// Errors raised while loading presets and profiles.
///
/// Per-field problems inside a profile are not errors: they are collected in a
/// [`ValidationResult`](crate::validation::ValidationResult) instead.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unknown preset '{name}'{}", did_you_mean(.suggestion))]
    UnknownPreset {
        name: String,
        suggestion: Option<String>,
    },

    #[error("preset '{preset}' extends '{base}', which itself has a base")]
    NestedBase { preset: String, base: String },

    #[error("preset file {path} is not a mapping")]
    NotAMapping { path: PathBuf },

    #[error("profile is invalid: {}", .errors.join("; "))]
    Invalid { errors: Vec<String> },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, ConfigError>;
