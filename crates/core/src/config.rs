use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Read `.env` into the process environment if one exists.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Environment reader scoped to a profile prefix.
///
/// With profile `PROD`, `lookup("POLL_INTERVAL_SECS")` checks
/// `PROD_POLL_INTERVAL_SECS` before `POLL_INTERVAL_SECS`. Empty values count
/// as unset.
struct Env<'a> {
    profile: &'a str,
}

impl Env<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        let non_empty = |k: &str| env::var(k).ok().filter(|v| !v.is_empty());
        (!self.profile.is_empty())
            .then(|| non_empty(&format!("{}_{key}", self.profile)))
            .flatten()
            .or_else(|| non_empty(key))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or_else(|| default.to_owned())
    }

    /// Unparseable values fall back to `default`.
    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.lookup(key)
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(default)
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upper-cased profile prefix, empty when none is active.
    pub profile: String,
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub worker: WorkerDefaults,
    pub presets: PresetConfig,
}

impl Config {
    /// Read settings from the environment under the profile named by
    /// `KILLWATCH_PROFILE`. Call [`load_dotenv`] first to pick up `.env`.
    pub fn from_env() -> Self {
        let profile = env::var("KILLWATCH_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Read settings under an explicit profile; `""` means unprefixed keys only.
    pub fn for_profile(profile: &str) -> Self {
        let profile = profile.trim().to_uppercase();
        let env = Env { profile: &profile };
        Self {
            store: StoreConfig::read(&env),
            fetch: FetchConfig::read(&env),
            worker: WorkerDefaults::read(&env),
            presets: PresetConfig::read(&env),
            profile,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(profile = self.profile_label(), "configuration resolved");
        tracing::info!(
            db = %self.store.database_path.display(),
            kill_retention_days = self.store.kill_retention_days,
            claim_stale_secs = self.store.claim_stale_secs,
            "store settings"
        );
        tracing::info!(
            base_url = %self.fetch.base_url,
            timeout_secs = self.fetch.timeout_secs,
            max_attempts = self.fetch.max_attempts,
            "detail fetch settings"
        );
        tracing::info!(
            poll_secs = self.worker.poll_interval_secs,
            batch = self.worker.batch_size,
            overlap_secs = self.worker.overlap_secs,
            "worker defaults"
        );
        if let Some(dir) = &self.presets.user_dir {
            tracing::info!(dir = %dir.display(), "user presets directory");
        }
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    /// Kills older than this are expunged by the maintenance sweep.
    pub kill_retention_days: u32,
    /// Processed markers older than this are purged.
    pub processed_retention_hours: u32,
    /// Enrichment claims older than this are considered abandoned.
    pub claim_stale_secs: u64,
    pub max_connections: u32,
}

impl StoreConfig {
    fn read(env: &Env<'_>) -> Self {
        Self {
            database_path: PathBuf::from(env.string("KILLWATCH_DB", "data/killwatch.db")),
            kill_retention_days: env.parsed("KILL_RETENTION_DAYS", 7),
            processed_retention_hours: env.parsed("PROCESSED_RETENTION_HOURS", 48),
            claim_stale_secs: env.parsed("CLAIM_STALE_SECS", 120),
            max_connections: env.parsed("DB_MAX_CONNECTIONS", 8),
        }
    }
}

// ── Detail fetch ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Transient failures tolerated before a kill becomes unfetchable.
    pub max_attempts: u32,
    pub user_agent: String,
}

impl FetchConfig {
    fn read(env: &Env<'_>) -> Self {
        Self {
            base_url: env.string("ESI_BASE_URL", "https://esi.evetech.net/latest"),
            timeout_secs: env.parsed("FETCH_TIMEOUT_SECS", 10),
            max_attempts: env.parsed("FETCH_MAX_ATTEMPTS", 3),
            user_agent: env.string("KILLWATCH_USER_AGENT", "killwatch/0.1"),
        }
    }
}

// ── Worker defaults ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDefaults {
    pub poll_interval_secs: u64,
    pub batch_size: u32,
    /// Look-back applied to the checkpoint to catch late arrivals.
    pub overlap_secs: u64,
    pub pending_queue_limit: u32,
    pub send_timeout_secs: u64,
    pub maintenance_interval_secs: u64,
}

impl WorkerDefaults {
    fn read(env: &Env<'_>) -> Self {
        Self {
            poll_interval_secs: env.parsed("POLL_INTERVAL_SECS", 15),
            batch_size: env.parsed("POLL_BATCH_SIZE", 200),
            overlap_secs: env.parsed("POLL_OVERLAP_SECS", 300),
            pending_queue_limit: env.parsed("PENDING_QUEUE_LIMIT", 500),
            send_timeout_secs: env.parsed("SEND_TIMEOUT_SECS", 10),
            maintenance_interval_secs: env.parsed("MAINTENANCE_INTERVAL_SECS", 3600),
        }
    }
}

// ── Presets ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetConfig {
    /// Optional directory of user preset YAML files (override built-ins by name).
    pub user_dir: Option<PathBuf>,
}

impl PresetConfig {
    fn read(env: &Env<'_>) -> Self {
        Self {
            user_dir: env.lookup("KILLWATCH_PRESET_DIR").map(PathBuf::from),
        }
    }
}
