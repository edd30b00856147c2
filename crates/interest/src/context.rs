//! Per-kill evaluation context assembled by the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use killwatch_core::{EnrichmentDetail, EnrichmentState, SystemId};
use killwatch_patterns::{AmbushAssessment, WarCheck};

/// Universe jump-distance lookup.
///
/// Returns `None` when the route is unknown or unreachable.
pub trait JumpDistance: Send + Sync {
    fn jumps(&self, from: SystemId, to: SystemId) -> Option<u32>;
}

/// Knows only that a system is zero jumps from itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJumpData;

impl JumpDistance for NoJumpData {
    fn jumps(&self, from: SystemId, to: SystemId) -> Option<u32> {
        (from == to).then_some(0)
    }
}

/// Precomputed symmetric jump table.
#[derive(Debug, Clone, Default)]
pub struct JumpTable {
    distances: HashMap<(SystemId, SystemId), u32>,
}

impl JumpTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, a: SystemId, b: SystemId, jumps: u32) {
        self.distances.insert(Self::key(a, b), jumps);
    }

    pub fn with(mut self, a: SystemId, b: SystemId, jumps: u32) -> Self {
        self.insert(a, b, jumps);
        self
    }

    fn key(a: SystemId, b: SystemId) -> (SystemId, SystemId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl JumpDistance for JumpTable {
    fn jumps(&self, from: SystemId, to: SystemId) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        self.distances.get(&Self::key(from, to)).copied()
    }
}

/// Everything the engine may consult besides the kill itself.
#[derive(Clone)]
pub struct EvaluationContext {
    pub now: DateTime<Utc>,
    /// Enrichment state of the kill being scored.
    pub enrichment: EnrichmentState,
    /// Kills in the same system within the activity window.
    pub recent_kills: u32,
    pub ambush: Option<AmbushAssessment>,
    pub war: Option<WarCheck>,
    pub jumps: Arc<dyn JumpDistance>,
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("now", &self.now)
            .field("enrichment", &self.enrichment)
            .field("recent_kills", &self.recent_kills)
            .field("ambush", &self.ambush.as_ref().map(|a| a.confidence))
            .field("war", &self.war.as_ref().map(|w| w.is_war_kill()))
            .finish()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl EvaluationContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            enrichment: EnrichmentState::Pending,
            recent_kills: 0,
            ambush: None,
            war: None,
            jumps: Arc::new(NoJumpData),
        }
    }

    pub fn with_enrichment(mut self, state: EnrichmentState) -> Self {
        self.enrichment = state;
        self
    }

    pub fn with_recent_kills(mut self, count: u32) -> Self {
        self.recent_kills = count;
        self
    }

    pub fn with_ambush(mut self, ambush: Option<AmbushAssessment>) -> Self {
        self.ambush = ambush;
        self
    }

    pub fn with_war(mut self, war: Option<WarCheck>) -> Self {
        self.war = war;
        self
    }

    pub fn with_jumps(mut self, jumps: Arc<dyn JumpDistance>) -> Self {
        self.jumps = jumps;
        self
    }

    pub fn detail(&self) -> Option<&EnrichmentDetail> {
        self.enrichment.detail()
    }

    /// Detail has not been fetched yet and still could be.
    pub fn awaiting_detail(&self) -> bool {
        matches!(self.enrichment, EnrichmentState::Pending)
    }
}
