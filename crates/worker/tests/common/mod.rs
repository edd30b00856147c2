//! Shared fixtures: scripted notifier and detail fetcher, kill builders.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use killwatch_core::config::WorkerDefaults;
use killwatch_core::{AttackerSummary, EnrichmentDetail, KillId, Killmail};
use killwatch_interest::{parse_profile, InterestEngine, InterestProfile, PresetRegistry};
use killwatch_notify::{Notification, Notifier, NotifyError};
use killwatch_store::EventStore;
use killwatch_worker::{DetailFetcher, FetchError, NotificationWorker, WorkerSettings};

// ── Notifier ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNotifier {
    pub calls: AtomicUsize,
    pub delivered: Mutex<Vec<Notification>>,
    script: Mutex<VecDeque<Result<(), NotifyError>>>,
}

impl MockNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the outcome of the next send. Unscripted sends succeed.
    pub fn then(&self, outcome: Result<(), NotifyError>) -> &Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_kill_ids(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .filter_map(|n| n.metadata.get("kill_id").cloned())
            .collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.delivered.lock().unwrap().push(notification.clone());
        }
        outcome
    }

    fn channel_name(&self) -> &str {
        "mock"
    }
}

// ── Detail fetcher ──────────────────────────────────────────────────

pub enum FetchScript {
    Detail(EnrichmentDetail),
    NotFound,
    Transient,
}

#[derive(Default)]
pub struct MockFetcher {
    pub calls: AtomicUsize,
    script: Mutex<HashMap<KillId, FetchScript>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, kill_id: KillId, outcome: FetchScript) {
        self.script.lock().unwrap().insert(kill_id, outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetailFetcher for MockFetcher {
    async fn fetch(&self, kill_id: KillId, _hash: &str) -> Result<EnrichmentDetail, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().get(&kill_id) {
            Some(FetchScript::Detail(detail)) => Ok(detail.clone()),
            Some(FetchScript::NotFound) | None => Err(FetchError::NotFound),
            Some(FetchScript::Transient) => Err(FetchError::Transient("502 Bad Gateway".into())),
        }
    }
}

// ── Builders ────────────────────────────────────────────────────────

pub fn kill(id: KillId, system: i64, at: DateTime<Utc>, pod: bool) -> Killmail {
    Killmail {
        kill_id: id,
        kill_time: at,
        solar_system_id: system,
        victim_ship_type_id: if pod { 670 } else { 587 },
        victim_corporation_id: Some(98_000_000 + id),
        victim_alliance_id: None,
        attackers: AttackerSummary {
            count: 1,
            corporation_ids: BTreeSet::from([98_500_000]),
            alliance_ids: BTreeSet::new(),
            ship_type_ids: BTreeSet::from([11_987]),
        },
        final_blow_ship_type_id: Some(11_987),
        total_value: 1_000_000.0,
        is_pod_kill: pod,
        hash: format!("hash{id}"),
    }
}

pub fn settings(id: &str) -> WorkerSettings {
    let defaults = WorkerDefaults {
        poll_interval_secs: 1,
        batch_size: 100,
        overlap_secs: 300,
        pending_queue_limit: 10,
        send_timeout_secs: 5,
        maintenance_interval_secs: 3600,
    };
    WorkerSettings::new(id, &defaults)
}

pub fn profile(yaml: &str) -> InterestProfile {
    let presets = PresetRegistry::builtin().unwrap();
    parse_profile(yaml, &presets, &InterestEngine::new())
        .unwrap()
        .into_valid()
        .unwrap()
}

/// Pod kills always notify; everything else sits below the digest threshold.
pub const POD_ONLY: &str = r#"
preset: balanced
rules:
  always_notify: [pod_kill]
thresholds:
  digest: 0.9
  notify: 0.95
  priority: 0.99
"#;

pub fn worker(
    store: &EventStore,
    settings: WorkerSettings,
    yaml: &str,
    notifier: Arc<MockNotifier>,
    fetcher: Arc<MockFetcher>,
) -> NotificationWorker {
    NotificationWorker::new(settings, profile(yaml), store.clone(), notifier, fetcher)
}
