//! War relationship tracker.
//!
//! Keeps a map of unordered entity pairs that are fighting each other. Pairs
//! are either inferred (enough kills between the same two sides within the
//! TTL) or registered from an authoritative source. Entities are alliances
//! where a side has them, corporations otherwise.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use killwatch_core::{is_npc_corporation, EntityId, Killmail};

/// Default number of kills between one pair before a war is inferred.
pub const DEFAULT_INFERENCE_THRESHOLD: u32 = 3;

/// Default inferred-relationship lifetime without fresh kills.
pub const DEFAULT_TTL_HOURS: i64 = 7 * 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarConfig {
    /// Kills between one pair needed to infer a relationship.
    pub inference_threshold: u32,
    /// Lifetime of inferred relationships (and candidates) since the last kill.
    pub ttl_hours: i64,
}

impl Default for WarConfig {
    fn default() -> Self {
        Self {
            inference_threshold: DEFAULT_INFERENCE_THRESHOLD,
            ttl_hours: DEFAULT_TTL_HOURS,
        }
    }
}

impl WarConfig {
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours.max(0))
    }
}

/// Unordered entity pair; `(a, b)` and `(b, a)` produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub low: EntityId,
    pub high: EntityId,
}

impl PairKey {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.low == entity || self.high == entity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarSource {
    Inferred,
    Authoritative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarRelationship {
    pub pair: PairKey,
    /// Side that attacked first (inferred) or declared (authoritative).
    pub aggressor: EntityId,
    pub first_observed: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
    /// Both sides have been seen attacking.
    pub mutual: bool,
    pub source: WarSource,
    pub kill_count: u32,
    pub expires_at: DateTime<Utc>,
}

impl WarRelationship {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_authoritative(&self) -> bool {
        self.source == WarSource::Authoritative
    }

    pub fn involves(&self, entity: EntityId) -> bool {
        self.pair.contains(entity)
    }
}

/// The two sides of one kill at war-key granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillParties {
    pub victim: EntityId,
    pub attackers: BTreeSet<EntityId>,
}

/// Normalise a kill to its victim entity and attacking entities.
///
/// Alliance ids are used whenever either side has one; corporation ids only
/// when neither side does, so a pair never mixes the two. A side without an
/// alliance is dropped in alliance mode. NPC corporations and self-kills are
/// dropped. Returns `None` when either side ends up empty.
pub fn kill_parties(kill: &Killmail) -> Option<KillParties> {
    let alliance_mode =
        kill.victim_alliance_id.is_some() || !kill.attackers.alliance_ids.is_empty();

    let (victim, attackers) = if alliance_mode {
        (kill.victim_alliance_id?, kill.attackers.alliance_ids.clone())
    } else {
        let corps = kill
            .attackers
            .corporation_ids
            .iter()
            .copied()
            .filter(|c| !is_npc_corporation(*c))
            .collect();
        (kill.victim_corporation_id?, corps)
    };
    let attackers: BTreeSet<EntityId> = attackers.into_iter().filter(|a| *a != victim).collect();

    if attackers.is_empty() {
        return None;
    }
    Some(KillParties { victim, attackers })
}

/// Result of [`WarTracker::check_kill`].
#[derive(Debug, Clone, PartialEq)]
pub struct WarCheck {
    /// Attacking entity (the one at war when a relationship matched).
    pub attacker: EntityId,
    pub victim: EntityId,
    pub relationship: Option<WarRelationship>,
}

impl WarCheck {
    pub fn is_war_kill(&self) -> bool {
        self.relationship.is_some()
    }

    /// Whether the attacker is the side that started the war.
    pub fn attacker_is_aggressor(&self) -> Option<bool> {
        self.relationship
            .as_ref()
            .map(|r| r.aggressor == self.attacker)
    }
}

/// What [`WarTracker::observe_kill`] did with one attacker/victim pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarObservation {
    /// An active relationship was refreshed.
    Touched(PairKey),
    /// Enough kills accumulated; a new relationship was inferred.
    Inferred(PairKey),
    /// Still below the inference threshold.
    Candidate { pair: PairKey, kills: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Candidate {
    pair: PairKey,
    aggressor: EntityId,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    kills: u32,
    mutual: bool,
}

#[derive(Serialize, Deserialize)]
struct TrackerSnapshot {
    #[serde(default)]
    config: WarConfig,
    #[serde(default)]
    relationships: Vec<WarRelationship>,
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// In-memory war relationship map. Serializes as a flat snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "TrackerSnapshot", into = "TrackerSnapshot")]
pub struct WarTracker {
    config: WarConfig,
    relationships: HashMap<PairKey, WarRelationship>,
    candidates: HashMap<PairKey, Candidate>,
}

impl From<TrackerSnapshot> for WarTracker {
    fn from(s: TrackerSnapshot) -> Self {
        Self {
            config: s.config,
            relationships: s.relationships.into_iter().map(|r| (r.pair, r)).collect(),
            candidates: s.candidates.into_iter().map(|c| (c.pair, c)).collect(),
        }
    }
}

impl From<WarTracker> for TrackerSnapshot {
    fn from(t: WarTracker) -> Self {
        let mut relationships: Vec<_> = t.relationships.into_values().collect();
        relationships.sort_by_key(|r| r.pair);
        let mut candidates: Vec<_> = t.candidates.into_values().collect();
        candidates.sort_by_key(|c| c.pair);
        Self {
            config: t.config,
            relationships,
            candidates,
        }
    }
}

impl WarTracker {
    pub fn new(config: WarConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &WarConfig {
        &self.config
    }

    /// Active relationship for a pair, if any.
    pub fn get(&self, a: EntityId, b: EntityId, now: DateTime<Utc>) -> Option<&WarRelationship> {
        self.relationships
            .get(&PairKey::new(a, b))
            .filter(|r| r.is_active(now))
    }

    pub fn active_relationships(&self, now: DateTime<Utc>) -> Vec<&WarRelationship> {
        let mut active: Vec<_> = self
            .relationships
            .values()
            .filter(|r| r.is_active(now))
            .collect();
        active.sort_by_key(|r| r.pair);
        active
    }

    /// Normalise `kill` to its parties and look up an active relationship.
    ///
    /// Read-only. Returns `None` when the kill has no usable parties.
    pub fn check_kill(&self, kill: &Killmail, now: DateTime<Utc>) -> Option<WarCheck> {
        let parties = kill_parties(kill)?;
        for attacker in &parties.attackers {
            if let Some(rel) = self.get(*attacker, parties.victim, now) {
                return Some(WarCheck {
                    attacker: *attacker,
                    victim: parties.victim,
                    relationship: Some(rel.clone()),
                });
            }
        }
        let attacker = parties.attackers.iter().next().copied()?;
        Some(WarCheck {
            attacker,
            victim: parties.victim,
            relationship: None,
        })
    }

    /// Feed one kill into the tracker, using its kill time as "now".
    pub fn observe_kill(&mut self, kill: &Killmail) -> Vec<WarObservation> {
        let Some(parties) = kill_parties(kill) else {
            return Vec::new();
        };
        let now = kill.kill_time;
        let ttl = self.config.ttl();
        let threshold = self.config.inference_threshold.max(1);

        let mut out = Vec::with_capacity(parties.attackers.len());
        for attacker in parties.attackers {
            let pair = PairKey::new(attacker, parties.victim);

            if let Some(rel) = self.relationships.get_mut(&pair) {
                if rel.is_active(now) {
                    rel.kill_count = rel.kill_count.saturating_add(1);
                    if now > rel.last_observed {
                        rel.last_observed = now;
                    }
                    if attacker != rel.aggressor {
                        rel.mutual = true;
                    }
                    if rel.source == WarSource::Inferred {
                        rel.expires_at = rel.last_observed + ttl;
                    }
                    out.push(WarObservation::Touched(pair));
                    continue;
                }
                self.relationships.remove(&pair);
            }

            let candidate = self.candidates.entry(pair).or_insert_with(|| Candidate {
                pair,
                aggressor: attacker,
                first_seen: now,
                last_seen: now,
                kills: 0,
                mutual: false,
            });
            if candidate.last_seen + ttl <= now {
                *candidate = Candidate {
                    pair,
                    aggressor: attacker,
                    first_seen: now,
                    last_seen: now,
                    kills: 0,
                    mutual: false,
                };
            }
            candidate.kills += 1;
            candidate.first_seen = candidate.first_seen.min(now);
            candidate.last_seen = candidate.last_seen.max(now);
            if attacker != candidate.aggressor {
                candidate.mutual = true;
            }

            if candidate.kills >= threshold {
                let c = candidate.clone();
                self.candidates.remove(&pair);
                info!(
                    low = pair.low,
                    high = pair.high,
                    kills = c.kills,
                    mutual = c.mutual,
                    "inferred war relationship"
                );
                self.relationships.insert(
                    pair,
                    WarRelationship {
                        pair,
                        aggressor: c.aggressor,
                        first_observed: c.first_seen,
                        last_observed: c.last_seen,
                        mutual: c.mutual,
                        source: WarSource::Inferred,
                        kill_count: c.kills,
                        expires_at: c.last_seen + ttl,
                    },
                );
                out.push(WarObservation::Inferred(pair));
            } else {
                out.push(WarObservation::Candidate {
                    pair,
                    kills: candidate.kills,
                });
            }
        }
        out
    }

    /// Register a war from an authoritative feed. It expires at `expires_at`
    /// regardless of later kills. Existing kill history for the pair is kept.
    pub fn register_authoritative(
        &mut self,
        aggressor: EntityId,
        defender: EntityId,
        declared: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> &WarRelationship {
        let pair = PairKey::new(aggressor, defender);
        let previous = self.relationships.remove(&pair);
        let pending = self.candidates.remove(&pair);
        let kill_count = previous.as_ref().map(|r| r.kill_count).unwrap_or(0)
            + pending.as_ref().map(|c| c.kills).unwrap_or(0);
        let mutual = previous.as_ref().is_some_and(|r| r.mutual)
            || pending.as_ref().is_some_and(|c| c.mutual);
        let first_observed = previous
            .as_ref()
            .map(|r| r.first_observed.min(declared))
            .unwrap_or(declared);
        let last_observed = previous
            .as_ref()
            .map(|r| r.last_observed.max(declared))
            .unwrap_or(declared);

        debug!(aggressor, defender, %expires_at, "registered authoritative war");
        self.relationships.entry(pair).or_insert(WarRelationship {
            pair,
            aggressor,
            first_observed,
            last_observed,
            mutual,
            source: WarSource::Authoritative,
            kill_count,
            expires_at,
        })
    }

    /// Drop expired relationships and stale candidates. Returns how many
    /// relationships were removed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.relationships.len();
        self.relationships.retain(|_, r| r.is_active(now));
        let ttl = self.config.ttl();
        self.candidates.retain(|_, c| c.last_seen + ttl > now);
        let removed = before - self.relationships.len();
        if removed > 0 {
            debug!(removed, "expired war relationships");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}
