//! Built-in and user-supplied interest presets.
//!
//! A preset is a profile document with full defaults. Presets may name a
//! `base` preset; the base is merged underneath with [`merge_preset`].
//! Built-ins are expanded when the registry is built, so a user preset can
//! base on any of them. Among user presets only a single level is allowed:
//! a base that itself still has a base is an error.

pub mod merge;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{info, warn};

use crate::error::{ConfigError, Result};
use crate::validation::fuzzy_match;

pub use merge::{deep_merge, merge_preset};

pub const DEFAULT_PRESET: &str = "balanced";

const BUILTIN_PRESETS: [(&str, &str); 4] = [
    ("balanced", include_str!("../../presets/balanced.yaml")),
    ("hunter", include_str!("../../presets/hunter.yaml")),
    ("industrial", include_str!("../../presets/industrial.yaml")),
    ("political", include_str!("../../presets/political.yaml")),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetSource {
    BuiltIn,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub value: Value,
    pub source: PresetSource,
}

impl Preset {
    pub fn base(&self) -> Option<&str> {
        self.value.get("base").and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.value.get("description").and_then(Value::as_str)
    }
}

/// Outcome of loading one preset file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

#[derive(Debug, PartialEq)]
pub enum LoadStatus {
    Loaded { name: String },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: BTreeMap<String, Preset>,
}

impl PresetRegistry {
    /// Registry holding the four built-in presets, each already merged
    /// over its base.
    pub fn builtin() -> Result<Self> {
        let mut raw = Self::default();
        for (name, text) in BUILTIN_PRESETS {
            let value: Value = serde_yaml::from_str(text)?;
            raw.insert(name, value, PresetSource::BuiltIn);
        }

        let mut reg = Self::default();
        for (name, _) in BUILTIN_PRESETS {
            reg.insert(name, raw.resolve(name)?, PresetSource::BuiltIn);
        }
        Ok(reg)
    }

    /// Built-ins plus every preset file in `dir`. User presets win on name
    /// collision.
    pub fn with_user_dir(dir: &Path) -> Result<Self> {
        let mut reg = Self::builtin()?;
        for result in reg.load_dir(dir)? {
            if let LoadStatus::Failed { error } = &result.status {
                warn!(path = %result.path.display(), error = %error, "failed to load preset");
            }
        }
        Ok(reg)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value, source: PresetSource) {
        let name = name.into();
        self.presets.insert(
            name.clone(),
            Preset {
                name,
                value,
                source,
            },
        );
    }

    /// Load `*.yml` / `*.yaml` files from `dir` (non-recursive). Dotfiles and
    /// other extensions are skipped; per-file parse errors do not abort.
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<LoadResult>> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read preset directory");
                return Ok(Vec::new());
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if file_name.starts_with('.') {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "dotfile".to_string(),
                    },
                });
                continue;
            }
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yml" || e == "yaml");
            if !is_yaml {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            let status = match Self::read_preset(&path) {
                Ok((name, value)) => {
                    if self.presets.contains_key(&name) {
                        info!(preset = %name, path = %path.display(), "user preset overrides existing preset");
                    } else {
                        info!(preset = %name, path = %path.display(), "loaded preset");
                    }
                    self.insert(name.clone(), value, PresetSource::File(path.clone()));
                    LoadStatus::Loaded { name }
                }
                Err(e) => LoadStatus::Failed {
                    error: e.to_string(),
                },
            };
            results.push(LoadResult { path, status });
        }
        Ok(results)
    }

    fn read_preset(path: &Path) -> Result<(String, Value)> {
        let text = fs::read_to_string(path)?;
        let value: Value = serde_yaml::from_str(&text)?;
        if !value.is_mapping() {
            return Err(ConfigError::NotAMapping {
                path: path.to_path_buf(),
            });
        }
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .unwrap_or_default();
        Ok((name, value))
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    fn lookup(&self, name: &str) -> Result<&Preset> {
        self.presets.get(name).ok_or_else(|| ConfigError::UnknownPreset {
            name: name.to_string(),
            suggestion: fuzzy_match(name, &self.names()).map(str::to_string),
        })
    }

    /// Preset `name` with its base merged underneath.
    pub fn resolve(&self, name: &str) -> Result<Value> {
        let preset = self.lookup(name)?;
        let Some(base_name) = preset.base() else {
            return Ok(preset.value.clone());
        };
        let base = self.lookup(base_name)?;
        if base.base().is_some() {
            return Err(ConfigError::NestedBase {
                preset: name.to_string(),
                base: base_name.to_string(),
            });
        }
        Ok(merge_preset(&base.value, &preset.value))
    }
}
