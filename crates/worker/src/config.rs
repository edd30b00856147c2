//! Worker definitions loaded from a YAML file.
//!
//! ```yaml
//! workers:
//!   - id: amarr-hunter
//!     profile: profiles/hunter.yaml
//!     webhook:
//!       url: https://discord.com/api/webhooks/${HOOK_ID}/${HOOK_TOKEN}
//!     delivery: immediate
//!     poll_interval_secs: 10
//! ```
//!
//! Unset timing fields fall back to the environment-level
//! [`WorkerDefaults`](killwatch_core::config::WorkerDefaults).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use killwatch_core::config::{Config, StoreConfig, WorkerDefaults};
use killwatch_core::{EntityId, SystemId};
use killwatch_notify::MessageTemplates;
use killwatch_patterns::{AmbushConfig, WarConfig};

use crate::error::{Result, WorkerError};

/// How NOTIFY-tier kills leave the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One message per kill.
    #[default]
    Immediate,
    /// Everything goes into the cycle's rollup summary.
    Rollup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    /// Flush once this many kills are buffered, even before `max_wait_secs`.
    pub max_size: usize,
    /// Hold kills across cycles for up to this long; 0 flushes every cycle.
    pub max_wait_secs: u64,
    /// Kills listed individually in the summary.
    pub top_kills: usize,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            max_wait_secs: 0,
            top_kills: 5,
        }
    }
}

/// A war declared by the game rather than inferred from kills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredWar {
    pub aggressor: EntityId,
    pub defender: EntityId,
    pub declared: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: String,
    /// Interest profile YAML, relative to the workers file.
    pub profile: PathBuf,
    pub webhook: WebhookConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub delivery: DeliveryMode,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub overlap_secs: Option<u64>,
    /// How far back a worker with no checkpoint starts.
    #[serde(default)]
    pub initial_lookback_secs: Option<u64>,
    #[serde(default)]
    pub pending_queue_limit: Option<u32>,
    #[serde(default)]
    pub rollup: RollupConfig,
    #[serde(default)]
    pub templates: MessageTemplates,
    #[serde(default)]
    pub ambush: AmbushConfig,
    #[serde(default)]
    pub war: WarConfig,
    #[serde(default)]
    pub wars: Vec<DeclaredWar>,
    /// War tracker snapshot file, loaded at start and written at stop.
    #[serde(default)]
    pub war_snapshot: Option<PathBuf>,
    /// Display names for systems in messages.
    #[serde(default)]
    pub system_names: BTreeMap<SystemId, String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkersFile {
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

impl WorkersFile {
    /// Read and check a workers file. Relative profile and snapshot paths
    /// are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut file = Self::parse(&text)?;
        if let Some(dir) = path.parent() {
            for worker in &mut file.workers {
                if worker.profile.is_relative() {
                    worker.profile = dir.join(&worker.profile);
                }
                if let Some(snapshot) = worker.war_snapshot.as_mut() {
                    if snapshot.is_relative() {
                        *snapshot = dir.join(&*snapshot);
                    }
                }
            }
        }
        Ok(file)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        let file: WorkersFile = serde_yaml::from_str(yaml)?;
        file.check()?;
        Ok(file)
    }

    fn check(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for worker in &self.workers {
            if worker.id.trim().is_empty() {
                return Err(WorkerError::Config("worker id must not be empty".into()));
            }
            if !seen.insert(worker.id.as_str()) {
                return Err(WorkerError::Config(format!("duplicate worker id '{}'", worker.id)));
            }
            if worker.batch_size == Some(0) {
                return Err(WorkerError::Config(format!(
                    "worker '{}': batch_size must be positive",
                    worker.id
                )));
            }
            for war in &worker.wars {
                if war.expires_at <= war.declared {
                    return Err(WorkerError::Config(format!(
                        "worker '{}': war {} -> {} expires before it is declared",
                        worker.id, war.aggressor, war.defender
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn enabled(&self) -> impl Iterator<Item = &WorkerConfig> {
        self.workers.iter().filter(|w| w.enabled)
    }
}

/// Retention applied by the maintenance sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct Retention {
    pub kills: chrono::Duration,
    pub processed: chrono::Duration,
    pub stale_claims: Duration,
    pub interval: Duration,
}

impl Retention {
    pub fn from_config(store: &StoreConfig, defaults: &WorkerDefaults) -> Self {
        Self {
            kills: chrono::Duration::days(i64::from(store.kill_retention_days)),
            processed: chrono::Duration::hours(i64::from(store.processed_retention_hours)),
            stale_claims: Duration::from_secs(store.claim_stale_secs),
            interval: Duration::from_secs(defaults.maintenance_interval_secs),
        }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            kills: chrono::Duration::days(7),
            processed: chrono::Duration::hours(48),
            stale_claims: Duration::from_secs(120),
            interval: Duration::from_secs(3600),
        }
    }
}

/// Fully resolved runtime settings for one worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub id: String,
    pub poll_interval: Duration,
    /// Ceiling for the failure backoff.
    pub max_backoff: Duration,
    pub batch_size: u32,
    pub overlap: chrono::Duration,
    pub initial_lookback: chrono::Duration,
    pub pending_queue_limit: usize,
    pub delivery: DeliveryMode,
    pub rollup: RollupConfig,
    pub max_fetch_attempts: u32,
    pub retention: Retention,
    pub ambush: AmbushConfig,
    pub war: WarConfig,
    pub wars: Vec<DeclaredWar>,
    pub war_snapshot: Option<PathBuf>,
    pub system_names: BTreeMap<SystemId, String>,
}

impl WorkerSettings {
    /// Settings for `id` using only environment defaults.
    pub fn new(id: impl Into<String>, defaults: &WorkerDefaults) -> Self {
        Self {
            id: id.into(),
            poll_interval: Duration::from_secs(defaults.poll_interval_secs.max(1)),
            max_backoff: Duration::from_secs(300),
            batch_size: defaults.batch_size.max(1),
            overlap: chrono::Duration::seconds(defaults.overlap_secs as i64),
            initial_lookback: chrono::Duration::hours(1),
            pending_queue_limit: defaults.pending_queue_limit.max(1) as usize,
            delivery: DeliveryMode::default(),
            rollup: RollupConfig::default(),
            max_fetch_attempts: 3,
            retention: Retention::default(),
            ambush: AmbushConfig::default(),
            war: WarConfig::default(),
            wars: Vec::new(),
            war_snapshot: None,
            system_names: BTreeMap::new(),
        }
    }

    /// Merge a worker definition over the environment config.
    pub fn resolve(worker: &WorkerConfig, config: &Config) -> Self {
        let defaults = &config.worker;
        let mut settings = Self::new(worker.id.clone(), defaults);
        if let Some(secs) = worker.poll_interval_secs {
            settings.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(size) = worker.batch_size {
            settings.batch_size = size.max(1);
        }
        if let Some(secs) = worker.overlap_secs {
            settings.overlap = chrono::Duration::seconds(secs as i64);
        }
        if let Some(secs) = worker.initial_lookback_secs {
            settings.initial_lookback = chrono::Duration::seconds(secs as i64);
        }
        if let Some(limit) = worker.pending_queue_limit {
            settings.pending_queue_limit = limit.max(1) as usize;
        }
        settings.delivery = worker.delivery;
        settings.rollup = worker.rollup.clone();
        settings.max_fetch_attempts = config.fetch.max_attempts.max(1);
        settings.retention = Retention::from_config(&config.store, defaults);
        settings.ambush = worker.ambush.clone();
        settings.war = worker.war.clone();
        settings.wars = worker.wars.clone();
        settings.war_snapshot = worker.war_snapshot.clone();
        settings.system_names = worker.system_names.clone();
        settings
    }
}
