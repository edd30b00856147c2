//! Notification worker: poll the store, score each kill, deliver.
//!
//! One [`NotificationWorker`] owns everything mutable about a worker (war
//! tracker, cooldown queue, rollup buffer). Workers never share in-memory
//! state; the only cross-worker coordination is the store's enrichment claim.
//!
//! Kills that are queued, buffered or failed stay unmarked in the processed
//! ledger, and the checkpoint never advances past the oldest of them, so a
//! restart re-polls anything that was not delivered.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use killwatch_core::{Config, EnrichmentState, KillId, Killmail, Tier};
use killwatch_interest::{
    load_profile, EvaluationContext, InterestEngine, InterestProfile, InterestResult,
    JumpDistance, NoJumpData, PresetRegistry,
};
use killwatch_notify::{
    Notification, Notifier, NotifyError, RollupView, TemplateContext, TemplateRenderer,
    WebhookNotifier,
};
use killwatch_patterns::{AmbushDetector, WarTracker};
use killwatch_store::{EventStore, WorkerCheckpoint};

use crate::config::{DeliveryMode, WorkerConfig, WorkerSettings};
use crate::cooldown::Cooldown;
use crate::error::{Result, WorkerError};
use crate::fetch::{DetailFetcher, HttpDetailFetcher};
use crate::format::{interest_view, kill_view};
use crate::rollup::{RollupBatcher, RollupEntry};

/// Kill ids remembered for war observation dedup across overlapping polls.
const OBSERVED_MEMORY: usize = 4096;

// ── Poll summary ────────────────────────────────────────────────────

/// Counters for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Rows returned by the store.
    pub polled: usize,
    /// Rows skipped because they already wait in the queue or rollup.
    pub held: usize,
    pub filtered: usize,
    pub sent: usize,
    /// Deferred into the cooldown queue.
    pub queued: usize,
    pub rolled_up: usize,
    /// Dropped from a full cooldown queue.
    pub dropped: usize,
    /// Sends (single or rollup) that failed for a reason other than rate limiting.
    pub failed: usize,
    pub fetched: usize,
    pub rollups_sent: usize,
    pub wars_expired: usize,
}

/// A rendered single-kill notification waiting out a cooldown.
#[derive(Debug, Clone)]
pub struct PendingNotification {
    pub kill_id: KillId,
    pub kill_time: DateTime<Utc>,
    pub notification: Notification,
}

enum SendOutcome {
    Sent,
    RateLimited(u64),
    Failed,
}

struct Cycle {
    now: DateTime<Utc>,
    summary: PollSummary,
    /// Oldest kill time that must stay re-pollable.
    held_back: Option<DateTime<Utc>>,
}

impl Cycle {
    fn hold_back(&mut self, kill_time: DateTime<Utc>) {
        self.held_back = Some(self.held_back.map_or(kill_time, |t| t.min(kill_time)));
    }
}

// ── NotificationWorker ──────────────────────────────────────────────

pub struct NotificationWorker {
    settings: WorkerSettings,
    profile: Arc<InterestProfile>,
    engine: Arc<InterestEngine>,
    needs_detail: bool,
    store: EventStore,
    notifier: Arc<dyn Notifier>,
    fetcher: Arc<dyn DetailFetcher>,
    renderer: TemplateRenderer,
    jumps: Arc<dyn JumpDistance>,
    detector: AmbushDetector,
    wars: WarTracker,
    observed: VecDeque<KillId>,
    observed_set: HashSet<KillId>,
    cooldown: Cooldown<PendingNotification>,
    rollup: RollupBatcher,
    consecutive_failures: u32,
    last_maintenance: Option<DateTime<Utc>>,
}

impl NotificationWorker {
    pub fn new(
        settings: WorkerSettings,
        profile: InterestProfile,
        store: EventStore,
        notifier: Arc<dyn Notifier>,
        fetcher: Arc<dyn DetailFetcher>,
    ) -> Self {
        let engine = Arc::new(InterestEngine::new());
        let needs_detail = engine.needs_detail(&profile);
        let wars = load_war_tracker(&settings);
        let rollup = RollupBatcher::new(
            settings.rollup.max_size,
            chrono::Duration::seconds(settings.rollup.max_wait_secs as i64),
        );
        let cooldown = Cooldown::new(settings.pending_queue_limit);
        let detector = AmbushDetector::new(settings.ambush.clone());

        Self {
            profile: Arc::new(profile),
            engine,
            needs_detail,
            store,
            notifier,
            fetcher,
            renderer: TemplateRenderer::new(),
            jumps: Arc::new(NoJumpData),
            detector,
            wars,
            observed: VecDeque::new(),
            observed_set: HashSet::new(),
            cooldown,
            rollup,
            consecutive_failures: 0,
            last_maintenance: None,
            settings,
        }
    }

    /// Build a worker from its YAML definition: load and validate the
    /// profile, then set up the webhook and detail fetch clients.
    pub fn from_config(
        worker: &WorkerConfig,
        config: &Config,
        store: EventStore,
        presets: &PresetRegistry,
    ) -> Result<Self> {
        let settings = WorkerSettings::resolve(worker, config);
        let engine = InterestEngine::new();

        let resolved = load_profile(&worker.profile, presets, &engine)?;
        for warning in &resolved.validation.warnings {
            warn!(worker = %worker.id, path = %warning.path, "{}", warning.message);
        }
        let profile = resolved.into_valid()?;

        let notifier = WebhookNotifier::from_config(
            worker.webhook.url.clone(),
            worker.webhook.method.clone(),
            Some(worker.webhook.headers.clone()),
            worker
                .webhook
                .timeout_secs
                .or(Some(config.worker.send_timeout_secs))
                .map(Duration::from_secs),
        )?;
        let fetcher = HttpDetailFetcher::from_config(&config.fetch)?;
        let renderer = TemplateRenderer::with_templates(worker.templates.clone())?;

        Ok(Self::new(settings, profile, store, Arc::new(notifier), Arc::new(fetcher))
            .with_renderer(renderer))
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_engine(mut self, engine: Arc<InterestEngine>) -> Self {
        self.needs_detail = engine.needs_detail(&self.profile);
        self.engine = engine;
        self
    }

    pub fn with_jumps(mut self, jumps: Arc<dyn JumpDistance>) -> Self {
        self.jumps = jumps;
        self
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn wars(&self) -> &WarTracker {
        &self.wars
    }

    pub fn pending_len(&self) -> usize {
        self.cooldown.len()
    }

    pub fn rollup_len(&self) -> usize {
        self.rollup.len()
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown.until()
    }

    // ── Run loop ────────────────────────────────────────────────────

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    /// The in-flight cycle always completes. Returns the worker so it can
    /// be restarted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        info!(
            worker = %self.settings.id,
            profile = %self.profile.name,
            poll_interval = ?self.settings.poll_interval,
            delivery = ?self.settings.delivery,
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(summary) => {
                    if summary.polled > 0 || summary.sent > 0 || summary.failed > 0 {
                        info!(
                            worker = %self.settings.id,
                            polled = summary.polled,
                            sent = summary.sent,
                            queued = summary.queued,
                            rolled_up = summary.rolled_up,
                            filtered = summary.filtered,
                            failed = summary.failed,
                            "poll cycle complete"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        worker = %self.settings.id,
                        error = %e,
                        consecutive_failures = self.consecutive_failures,
                        "poll cycle failed"
                    );
                }
            }

            if let Err(e) = self.maintain_if_due(Utc::now()).await {
                warn!(worker = %self.settings.id, error = %e, "maintenance sweep failed");
            }

            let delay = self.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.save_war_snapshot();
        info!(
            worker = %self.settings.id,
            pending = self.cooldown.len(),
            rollup = self.rollup.len(),
            "worker stopped"
        );
        self
    }

    /// Poll interval, doubled for every consecutive failed cycle.
    pub fn next_delay(&self) -> Duration {
        let base = self.settings.poll_interval;
        if self.consecutive_failures == 0 {
            return base;
        }
        let factor = 2u32.saturating_pow(self.consecutive_failures.min(16));
        base.saturating_mul(factor).min(self.settings.max_backoff.max(base))
    }

    // ── Poll cycle ──────────────────────────────────────────────────

    pub async fn poll_once(&mut self) -> Result<PollSummary> {
        self.poll_once_at(Utc::now()).await
    }

    /// One cycle with an explicit wall clock for cooldown and rollup timing.
    pub async fn poll_once_at(&mut self, now: DateTime<Utc>) -> Result<PollSummary> {
        let mut checkpoint = self.store.load_checkpoint(&self.settings.id).await?;
        let mut cycle = Cycle {
            now,
            summary: PollSummary::default(),
            held_back: None,
        };

        match self.run_cycle(&checkpoint, &mut cycle).await {
            Ok(newest) => {
                let cap = [
                    cycle.held_back,
                    self.cooldown.pending().map(|p| p.kill_time).min(),
                    self.rollup.oldest_kill_time(),
                ]
                .into_iter()
                .flatten()
                .min();
                let high_water = match (newest, cap) {
                    (Some(newest), Some(cap)) => Some(newest.min(cap)),
                    (newest, None) => newest,
                    (None, Some(_)) => None,
                };
                if let Some(t) = high_water {
                    checkpoint.last_processed_time =
                        Some(checkpoint.last_processed_time.map_or(t, |prev| prev.max(t)));
                }
                checkpoint.last_poll_time = Some(now);
                if cycle.summary.failed == 0 {
                    checkpoint.consecutive_failures = 0;
                } else {
                    checkpoint.consecutive_failures += 1;
                }
                self.consecutive_failures = checkpoint.consecutive_failures;
                self.store.save_checkpoint(&checkpoint).await?;
                Ok(cycle.summary)
            }
            Err(e) => {
                checkpoint.consecutive_failures += 1;
                checkpoint.last_poll_time = Some(now);
                self.consecutive_failures = checkpoint.consecutive_failures;
                if let Err(save_err) = self.store.save_checkpoint(&checkpoint).await {
                    warn!(worker = %self.settings.id, error = %save_err, "failed to record poll failure");
                }
                Err(e)
            }
        }
    }

    /// Returns the newest kill time seen in the page.
    async fn run_cycle(
        &mut self,
        checkpoint: &WorkerCheckpoint,
        cycle: &mut Cycle,
    ) -> Result<Option<DateTime<Utc>>> {
        cycle.summary.wars_expired = self.wars.expire(cycle.now);
        self.flush_pending(cycle).await?;

        let since = checkpoint
            .last_processed_time
            .map(|t| t - self.settings.overlap)
            .unwrap_or(cycle.now - self.settings.initial_lookback);
        let held = self.held_ids();
        cycle.summary.held = held.len();
        let kills = self
            .store
            .poll_unprocessed_excluding(&self.settings.id, since, self.settings.batch_size, &held)
            .await?;
        cycle.summary.polled = kills.len();
        debug!(
            worker = %self.settings.id,
            since = %since,
            polled = kills.len(),
            held = held.len(),
            "polled store"
        );

        let mut newest = None;
        for kill in &kills {
            newest = Some(kill.kill_time);
            self.process_kill(kill, cycle).await?;
        }

        if !self.cooldown.is_active(cycle.now) && self.rollup.should_flush(cycle.now) {
            self.send_rollup(cycle).await?;
        }
        Ok(newest)
    }

    /// Kills sitting in the pending queue or the rollup.
    fn held_ids(&self) -> Vec<KillId> {
        self.rollup
            .kill_ids()
            .chain(self.cooldown.pending().map(|p| p.kill_id))
            .collect()
    }

    async fn process_kill(&mut self, kill: &Killmail, cycle: &mut Cycle) -> Result<()> {
        let mut ctx = self.build_context(kill).await?;

        if self.needs_detail && ctx.awaiting_detail() {
            let bounds = self
                .engine
                .calculate_prefetch_bounds(kill, &ctx, &self.profile);
            if bounds.should_fetch(self.profile.thresholds.notify) {
                let state = self.enrich(kill, &mut cycle.summary).await?;
                ctx = ctx.with_enrichment(state);
            } else {
                debug!(
                    kill_id = kill.kill_id,
                    upper = bounds.upper,
                    "detail cannot reach notify threshold; skipping fetch"
                );
            }
        }

        let result = self.engine.evaluate(kill, &ctx, &self.profile);
        self.observe_wars(kill);

        for warning in &result.warnings {
            warn!(worker = %self.settings.id, kill_id = kill.kill_id, "{warning}");
        }
        debug!(
            worker = %self.settings.id,
            kill_id = kill.kill_id,
            score = result.score,
            tier = %result.tier,
            "evaluated kill"
        );

        self.dispatch(kill, &result, &ctx, cycle).await
    }

    async fn build_context(&self, kill: &Killmail) -> Result<EvaluationContext> {
        let at = kill.kill_time;
        let window = self
            .store
            .kills_in_system_window(
                kill.solar_system_id,
                self.detector.window_start(at),
                at + chrono::Duration::milliseconds(1),
            )
            .await?;
        let ambush = self
            .detector
            .detect_with_wars(kill.solar_system_id, &window, at, &self.wars);
        let war = self.wars.check_kill(kill, at);
        let enrichment = self.store.enrichment_state(kill.kill_id).await?;

        Ok(EvaluationContext::new(at)
            .with_recent_kills(u32::try_from(window.len()).unwrap_or(u32::MAX))
            .with_ambush(ambush.ambush)
            .with_war(war)
            .with_enrichment(enrichment)
            .with_jumps(self.jumps.clone()))
    }

    fn observe_wars(&mut self, kill: &Killmail) {
        if !self.observed_set.insert(kill.kill_id) {
            return;
        }
        self.observed.push_back(kill.kill_id);
        if self.observed.len() > OBSERVED_MEMORY {
            if let Some(old) = self.observed.pop_front() {
                self.observed_set.remove(&old);
            }
        }
        self.wars.observe_kill(kill);
    }

    // ── Enrichment ──────────────────────────────────────────────────

    /// Claim-gated detail fetch. Returns the kill's enrichment state
    /// afterwards; `Pending` when another worker holds the claim.
    async fn enrich(&self, kill: &Killmail, summary: &mut PollSummary) -> Result<EnrichmentState> {
        let worker = self.settings.id.as_str();
        if !self.store.try_claim_enrichment(kill.kill_id, worker).await? {
            debug!(worker, kill_id = kill.kill_id, "enrichment claimed elsewhere; scoring without detail");
            return Ok(self.store.enrichment_state(kill.kill_id).await?);
        }

        let outcome = self.fetch_and_store(kill).await;
        if let Err(e) = self.store.release_claim(kill.kill_id, worker).await {
            warn!(worker, kill_id = kill.kill_id, error = %e, "failed to release enrichment claim");
        }
        let state = outcome?;
        if !matches!(state, EnrichmentState::Pending) {
            summary.fetched += 1;
        }
        Ok(state)
    }

    async fn fetch_and_store(&self, kill: &Killmail) -> Result<EnrichmentState> {
        let current = self.store.enrichment_state(kill.kill_id).await?;
        if current.is_terminal() {
            return Ok(current);
        }

        match self.fetcher.fetch(kill.kill_id, &kill.hash).await {
            Ok(detail) => {
                self.store.store_enrichment(kill.kill_id, &detail).await?;
                debug!(kill_id = kill.kill_id, "stored enrichment detail");
            }
            Err(e) if e.is_permanent() => {
                warn!(kill_id = kill.kill_id, error = %e, "detail unfetchable");
                self.store.mark_unfetchable(kill.kill_id, &e.to_string()).await?;
            }
            Err(e) => {
                let attempts = self.store.record_fetch_failure(kill.kill_id).await?;
                if attempts >= self.settings.max_fetch_attempts {
                    warn!(
                        kill_id = kill.kill_id,
                        attempts,
                        error = %e,
                        "giving up on detail fetch"
                    );
                    self.store
                        .mark_unfetchable(
                            kill.kill_id,
                            &format!("gave up after {attempts} attempts: {e}"),
                        )
                        .await?;
                } else {
                    debug!(kill_id = kill.kill_id, attempts, error = %e, "transient fetch failure");
                }
            }
        }
        Ok(self.store.enrichment_state(kill.kill_id).await?)
    }

    // ── Dispatch ────────────────────────────────────────────────────

    async fn dispatch(
        &mut self,
        kill: &Killmail,
        result: &InterestResult,
        ctx: &EvaluationContext,
        cycle: &mut Cycle,
    ) -> Result<()> {
        let to_rollup = match result.tier {
            Tier::Filter => {
                if let Some(reason) = &result.filter_reason {
                    debug!(kill_id = kill.kill_id, reason = %reason, "filtered");
                }
                self.store.mark_processed(&self.settings.id, kill.kill_id).await?;
                cycle.summary.filtered += 1;
                return Ok(());
            }
            Tier::Digest => true,
            Tier::Notify | Tier::Priority => self.settings.delivery == DeliveryMode::Rollup,
        };

        if to_rollup {
            self.rollup.push(
                RollupEntry {
                    kill: kill.clone(),
                    score: result.score,
                    tier: result.tier,
                },
                cycle.now,
            );
            cycle.summary.rolled_up += 1;
            if self.rollup.is_full() && !self.cooldown.is_active(cycle.now) {
                self.send_rollup(cycle).await?;
            }
            return Ok(());
        }

        let view = interest_view(
            &self.profile.name,
            result,
            ctx.ambush.as_ref(),
            ctx.war.as_ref(),
        );
        let context = TemplateContext::for_kill(
            self.settings.id.clone(),
            kill_view(kill, &self.settings.system_names),
            view,
        );
        let notification = match self.renderer.render_kill(&context) {
            Ok(n) => n,
            Err(e) => {
                error!(worker = %self.settings.id, kill_id = kill.kill_id, error = %e, "failed to render notification");
                cycle.summary.failed += 1;
                cycle.hold_back(kill.kill_time);
                return Ok(());
            }
        };
        let pending = PendingNotification {
            kill_id: kill.kill_id,
            kill_time: kill.kill_time,
            notification,
        };

        if self.cooldown.is_active(cycle.now) {
            self.enqueue(pending, cycle).await?;
            return Ok(());
        }

        match self.send(&pending.notification, cycle.now).await {
            SendOutcome::Sent => {
                self.store.mark_processed(&self.settings.id, kill.kill_id).await?;
                cycle.summary.sent += 1;
            }
            SendOutcome::RateLimited(_) => {
                self.enqueue(pending, cycle).await?;
            }
            SendOutcome::Failed => {
                cycle.summary.failed += 1;
                cycle.hold_back(kill.kill_time);
            }
        }
        Ok(())
    }

    async fn send(&mut self, notification: &Notification, now: DateTime<Utc>) -> SendOutcome {
        match self.notifier.send(notification).await {
            Ok(()) => {
                self.cooldown.record_success();
                SendOutcome::Sent
            }
            Err(NotifyError::RateLimited { retry_after_secs }) => {
                self.cooldown.trip(retry_after_secs, now);
                SendOutcome::RateLimited(retry_after_secs)
            }
            Err(e) => {
                warn!(
                    worker = %self.settings.id,
                    channel = self.notifier.channel_name(),
                    error = %e,
                    "notification send failed"
                );
                SendOutcome::Failed
            }
        }
    }

    async fn enqueue(&mut self, pending: PendingNotification, cycle: &mut Cycle) -> Result<()> {
        debug!(worker = %self.settings.id, kill_id = pending.kill_id, "queued during cooldown");
        cycle.summary.queued += 1;
        if let Some(dropped) = self.cooldown.enqueue(pending) {
            warn!(
                worker = %self.settings.id,
                kill_id = dropped.kill_id,
                "dropped queued notification; queue limit reached"
            );
            self.store.mark_processed(&self.settings.id, dropped.kill_id).await?;
            cycle.summary.dropped += 1;
        }
        Ok(())
    }

    /// Send queued notifications oldest-first once the cooldown has expired.
    async fn flush_pending(&mut self, cycle: &mut Cycle) -> Result<()> {
        if self.cooldown.is_empty() || self.cooldown.is_active(cycle.now) {
            return Ok(());
        }
        info!(worker = %self.settings.id, queued = self.cooldown.len(), "flushing queued notifications");

        while let Some(pending) = self.cooldown.pop_ready(cycle.now) {
            match self.send(&pending.notification, cycle.now).await {
                SendOutcome::Sent => {
                    self.store.mark_processed(&self.settings.id, pending.kill_id).await?;
                    cycle.summary.sent += 1;
                }
                SendOutcome::RateLimited(_) => {
                    self.cooldown.requeue_front(pending);
                    break;
                }
                SendOutcome::Failed => {
                    // left unmarked; the next poll picks it up again
                    cycle.summary.failed += 1;
                    cycle.hold_back(pending.kill_time);
                }
            }
        }
        Ok(())
    }

    async fn send_rollup(&mut self, cycle: &mut Cycle) -> Result<()> {
        let entries = self.rollup.flush();
        if entries.is_empty() {
            return Ok(());
        }
        let oldest = entries.iter().map(|e| e.kill.kill_time).min();

        let views = entries
            .iter()
            .map(|e| kill_view(&e.kill, &self.settings.system_names))
            .collect();
        let context = TemplateContext::for_rollup(
            self.settings.id.clone(),
            RollupView::new(views, self.settings.rollup.top_kills),
        );

        let outcome = match self.renderer.render_rollup(&context) {
            Ok(notification) => self.send(&notification, cycle.now).await,
            Err(e) => {
                error!(worker = %self.settings.id, error = %e, "failed to render rollup");
                SendOutcome::Failed
            }
        };

        match outcome {
            SendOutcome::Sent => {
                for entry in &entries {
                    self.store.mark_processed(&self.settings.id, entry.kill.kill_id).await?;
                }
                info!(worker = %self.settings.id, kills = entries.len(), "rollup sent");
                cycle.summary.rollups_sent += 1;
            }
            SendOutcome::RateLimited(retry_after_secs) => {
                info!(
                    worker = %self.settings.id,
                    kills = entries.len(),
                    retry_after_secs,
                    "rollup rate limited; kills stay unmarked"
                );
                if let Some(t) = oldest {
                    cycle.hold_back(t);
                }
            }
            SendOutcome::Failed => {
                cycle.summary.failed += 1;
                if let Some(t) = oldest {
                    cycle.hold_back(t);
                }
            }
        }
        Ok(())
    }

    // ── Maintenance ─────────────────────────────────────────────────

    async fn maintain_if_due(&mut self, now: DateTime<Utc>) -> Result<()> {
        let interval = chrono::Duration::from_std(self.settings.retention.interval)
            .unwrap_or(chrono::Duration::hours(1));
        if self.last_maintenance.is_some_and(|last| now - last < interval) {
            return Ok(());
        }
        self.last_maintenance = Some(now);
        self.maintain(now).await?;
        self.save_war_snapshot();
        Ok(())
    }

    /// Run the three retention sweeps. Returns (kills, processed markers, claims).
    pub async fn maintain(&self, now: DateTime<Utc>) -> Result<(u64, u64, u64)> {
        let retention = &self.settings.retention;
        let kills = self.store.expunge_before(now - retention.kills).await?;
        let processed = self
            .store
            .expunge_processed_kills(now - retention.processed)
            .await?;
        let claims = self.store.expunge_stale_claims(retention.stale_claims).await?;
        info!(
            worker = %self.settings.id,
            kills,
            processed,
            claims,
            "maintenance sweep complete"
        );
        Ok((kills, processed, claims))
    }

    // ── War snapshot ────────────────────────────────────────────────

    pub fn save_war_snapshot(&self) {
        let Some(path) = &self.settings.war_snapshot else {
            return;
        };
        if let Err(e) = write_snapshot(path, &self.wars) {
            warn!(worker = %self.settings.id, path = %path.display(), error = %e, "failed to save war snapshot");
        }
    }
}

fn write_snapshot(path: &Path, wars: &WarTracker) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(wars)
        .map_err(|e| WorkerError::Config(format!("war snapshot: {e}")))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Restore the snapshot if present, then register declared wars on top.
fn load_war_tracker(settings: &WorkerSettings) -> WarTracker {
    let mut wars = match &settings.war_snapshot {
        Some(path) if path.exists() => match std::fs::read_to_string(path)
            .map_err(WorkerError::from)
            .and_then(|text| {
                serde_json::from_str::<WarTracker>(&text)
                    .map_err(|e| WorkerError::Config(format!("war snapshot: {e}")))
            }) {
            Ok(wars) => {
                info!(worker = %settings.id, path = %path.display(), "restored war snapshot");
                wars
            }
            Err(e) => {
                warn!(worker = %settings.id, path = %path.display(), error = %e, "ignoring unreadable war snapshot");
                WarTracker::new(settings.war.clone())
            }
        },
        _ => WarTracker::new(settings.war.clone()),
    };

    for war in &settings.wars {
        wars.register_authoritative(war.aggressor, war.defender, war.declared, war.expires_at);
    }
    wars
}

// ── WorkerHandle ────────────────────────────────────────────────────

enum HandleState {
    Stopped(Box<NotificationWorker>),
    Running {
        shutdown: watch::Sender<bool>,
        task: JoinHandle<NotificationWorker>,
    },
    /// The task panicked; the worker cannot be recovered.
    Lost,
}

/// Start/stop control over one worker running as a tokio task.
pub struct WorkerHandle {
    id: String,
    state: HandleState,
}

impl WorkerHandle {
    pub fn new(worker: NotificationWorker) -> Self {
        Self {
            id: worker.id().to_string(),
            state: HandleState::Stopped(Box::new(worker)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, HandleState::Running { .. })
    }

    pub fn start(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, HandleState::Lost) {
            HandleState::Stopped(worker) => {
                let (tx, rx) = watch::channel(false);
                let task = tokio::spawn((*worker).run(rx));
                self.state = HandleState::Running { shutdown: tx, task };
                Ok(())
            }
            running @ HandleState::Running { .. } => {
                self.state = running;
                Err(WorkerError::AlreadyRunning(self.id.clone()))
            }
            HandleState::Lost => Err(WorkerError::Task(format!(
                "worker '{}' was lost after a panic",
                self.id
            ))),
        }
    }

    /// Signal the task and wait for its current cycle to finish. Stopping a
    /// stopped worker is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, HandleState::Lost) {
            HandleState::Running { shutdown, task } => {
                // a closed receiver means the task already returned
                let _ = shutdown.send(true);
                match task.await {
                    Ok(worker) => {
                        self.state = HandleState::Stopped(Box::new(worker));
                        Ok(())
                    }
                    Err(e) => Err(WorkerError::Task(e.to_string())),
                }
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }
}
