//! killwatch-worker: runs notification workers against the event store.
//!
//! Subcommands:
//! - `run` : start every enabled worker from a workers YAML file
//! - `ingest` : load a JSON-lines killmail file into the store
//! - `validate` : resolve an interest profile and report problems
//! - `stats` : print store row counts

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use killwatch_core::config::load_dotenv;
use killwatch_core::{Config, Killmail};
use killwatch_interest::{load_profile, InterestEngine, PresetRegistry};
use killwatch_store::EventStore;
use killwatch_worker::{NotificationWorker, WorkerHandle, WorkersFile};

/// Rows per insert transaction during ingest.
const INGEST_CHUNK: usize = 500;

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "killwatch-worker", version, about)]
struct Cli {
    /// SQLite database path.
    #[arg(long, global = true, env = "KILLWATCH_DB")]
    db: Option<PathBuf>,

    /// Directory of user preset YAML files.
    #[arg(long, global = true, env = "KILLWATCH_PROFILES")]
    presets: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run all enabled workers until SIGINT/SIGTERM.
    Run {
        /// Workers definition file.
        #[arg(long, env = "KILLWATCH_WORKERS", default_value = "config/workers.yaml")]
        workers: PathBuf,

        /// Seconds to wait for in-flight poll cycles on shutdown.
        #[arg(long, env = "KILLWATCH_SHUTDOWN_TIMEOUT", default_value_t = 30)]
        shutdown_timeout: u64,
    },
    /// Insert killmails from a JSON-lines file (one killmail per line).
    Ingest { file: PathBuf },
    /// Resolve a profile and print validation errors and warnings.
    Validate {
        #[arg(long)]
        profile: PathBuf,
    },
    /// Print store statistics.
    Stats,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = &cli.db {
        config.store.database_path = db.clone();
    }
    if let Some(dir) = &cli.presets {
        config.presets.user_dir = Some(dir.clone());
    }

    match cli.command {
        Command::Run {
            workers,
            shutdown_timeout,
        } => run(&config, &workers, Duration::from_secs(shutdown_timeout)).await,
        Command::Ingest { file } => ingest(&config, &file).await,
        Command::Validate { profile } => validate(&config, &profile),
        Command::Stats => stats(&config).await,
    }
}

fn presets(config: &Config) -> Result<PresetRegistry> {
    let registry = match &config.presets.user_dir {
        Some(dir) => PresetRegistry::with_user_dir(dir)
            .with_context(|| format!("failed to load presets from {}", dir.display()))?,
        None => PresetRegistry::builtin().context("failed to load built-in presets")?,
    };
    Ok(registry)
}

async fn open_store(config: &Config) -> Result<EventStore> {
    let store = EventStore::open(&config.store.database_path, config.store.max_connections)
        .await
        .with_context(|| {
            format!(
                "failed to open event store at {}",
                config.store.database_path.display()
            )
        })?
        .with_claim_ttl(Duration::from_secs(config.store.claim_stale_secs));
    Ok(store)
}

// ── run ─────────────────────────────────────────────────────────────

async fn run(config: &Config, workers_path: &Path, shutdown_timeout: Duration) -> Result<()> {
    config.log_summary();

    let file = WorkersFile::load(workers_path)
        .with_context(|| format!("failed to load workers from {}", workers_path.display()))?;
    let presets = presets(config)?;
    let store = open_store(config).await?;

    let mut handles = Vec::new();
    for definition in file.enabled() {
        let worker = NotificationWorker::from_config(definition, config, store.clone(), &presets)
            .with_context(|| format!("failed to initialise worker '{}'", definition.id))?;
        let mut handle = WorkerHandle::new(worker);
        handle.start()?;
        handles.push(handle);
    }
    if handles.is_empty() {
        bail!("no enabled workers in {}", workers_path.display());
    }
    info!(workers = handles.len(), "killwatch-worker running");

    os_signal().await;
    info!("shutdown signal received");

    for handle in &mut handles {
        match tokio::time::timeout(shutdown_timeout, handle.stop()).await {
            Ok(Ok(())) => info!(worker = %handle.id(), "worker stopped gracefully"),
            Ok(Err(e)) => warn!(worker = %handle.id(), error = %e, "worker stop returned error"),
            Err(_) => warn!(worker = %handle.id(), "worker stop timed out"),
        }
    }

    store.close().await;
    info!("killwatch-worker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            _ => {
                warn!("failed to register unix signal handlers; falling back to ctrl_c");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for ctrl_c");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
        }
    }
}

// ── ingest ──────────────────────────────────────────────────────────

async fn ingest(config: &Config, path: &Path) -> Result<()> {
    let store = open_store(config).await?;
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut chunk: Vec<Killmail> = Vec::with_capacity(INGEST_CHUNK);
    let (mut read, mut inserted, mut rejected) = (0u64, 0u64, 0u64);
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        read += 1;
        let kill = match serde_json::from_str::<Killmail>(line) {
            Ok(kill) => kill,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping unparseable killmail");
                rejected += 1;
                continue;
            }
        };
        if let Err(e) = kill.validate() {
            warn!(line = line_no, error = %e, "skipping invalid killmail");
            rejected += 1;
            continue;
        }
        chunk.push(kill);
        if chunk.len() >= INGEST_CHUNK {
            inserted += store.insert_kills_batch(&chunk).await?;
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        inserted += store.insert_kills_batch(&chunk).await?;
    }

    let duplicates = read.saturating_sub(rejected + inserted);
    info!(read, inserted, duplicates, rejected, path = %path.display(), "ingest complete");
    println!("read {read}, inserted {inserted}, duplicates {duplicates}, rejected {rejected}");
    store.close().await;
    Ok(())
}

// ── validate ────────────────────────────────────────────────────────

fn validate(config: &Config, path: &Path) -> Result<()> {
    let presets = presets(config)?;
    let resolved = load_profile(path, &presets, &InterestEngine::new())
        .with_context(|| format!("failed to read profile {}", path.display()))?;

    for error in &resolved.validation.errors {
        println!("error: {error}");
    }
    for warning in &resolved.validation.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }

    if !resolved.validation.valid {
        bail!(
            "profile {} has {} error(s)",
            path.display(),
            resolved.validation.errors.len()
        );
    }
    let profile = &resolved.profile;
    println!(
        "ok: profile '{}' (preset {}, aggregation {:?}, thresholds digest={} notify={} priority={})",
        profile.name,
        profile.preset,
        profile.aggregation,
        profile.thresholds.digest,
        profile.thresholds.notify,
        profile.thresholds.priority
    );
    Ok(())
}

// ── stats ───────────────────────────────────────────────────────────

async fn stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.get_stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    store.close().await;
    Ok(())
}
