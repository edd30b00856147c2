//! Rollup accumulator for digest-tier (and rollup-mode) kills.
//!
//! Collects entries and reports a flush when either the size threshold or
//! the wait window is reached, whichever comes first. A zero wait window
//! flushes at every cycle end.

use chrono::{DateTime, Duration, Utc};

use killwatch_core::{KillId, Killmail, Tier};

/// One kill waiting in a rollup.
#[derive(Debug, Clone)]
pub struct RollupEntry {
    pub kill: Killmail,
    pub score: f64,
    pub tier: Tier,
}

#[derive(Debug)]
pub struct RollupBatcher {
    buffer: Vec<RollupEntry>,
    max_size: usize,
    max_wait: Duration,
    batch_started: Option<DateTime<Utc>>,
}

impl RollupBatcher {
    pub fn new(max_size: usize, max_wait: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            buffer: Vec::with_capacity(max_size),
            max_size,
            max_wait,
            batch_started: None,
        }
    }

    /// Add an entry. Starts the batch clock on the first push.
    pub fn push(&mut self, entry: RollupEntry, now: DateTime<Utc>) {
        if self.batch_started.is_none() {
            self.batch_started = Some(now);
        }
        self.buffer.push(entry);
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.max_size
    }

    pub fn should_flush(&self, now: DateTime<Utc>) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        if self.is_full() {
            return true;
        }
        self.batch_started
            .is_some_and(|started| now - started >= self.max_wait)
    }

    /// Take every buffered entry and reset the batch clock.
    pub fn flush(&mut self) -> Vec<RollupEntry> {
        self.batch_started = None;
        std::mem::take(&mut self.buffer)
    }

    pub fn try_flush(&mut self, now: DateTime<Utc>) -> Option<Vec<RollupEntry>> {
        if self.should_flush(now) {
            Some(self.flush())
        } else {
            None
        }
    }

    pub fn kill_ids(&self) -> impl Iterator<Item = KillId> + '_ {
        self.buffer.iter().map(|e| e.kill.kill_id)
    }

    pub fn oldest_kill_time(&self) -> Option<DateTime<Utc>> {
        self.buffer.iter().map(|e| e.kill.kill_time).min()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use killwatch_core::AttackerSummary;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn entry(id: KillId, minutes: i64) -> RollupEntry {
        RollupEntry {
            kill: Killmail {
                kill_id: id,
                kill_time: t0() + Duration::minutes(minutes),
                solar_system_id: 30000142,
                victim_ship_type_id: 587,
                victim_corporation_id: Some(1),
                victim_alliance_id: None,
                attackers: AttackerSummary::default(),
                final_blow_ship_type_id: None,
                total_value: 1_000_000.0,
                is_pod_kill: false,
                hash: format!("h{id}"),
            },
            score: 0.4,
            tier: Tier::Digest,
        }
    }

    #[test]
    fn flush_on_size() {
        let mut batcher = RollupBatcher::new(3, Duration::hours(1));
        for id in 1..=3 {
            batcher.push(entry(id, 0), t0());
        }
        assert!(batcher.should_flush(t0()));
    }

    #[test]
    fn no_flush_below_size_inside_window() {
        let mut batcher = RollupBatcher::new(5, Duration::minutes(10));
        batcher.push(entry(1, 0), t0());
        assert!(!batcher.should_flush(t0() + Duration::minutes(9)));
        assert!(batcher.should_flush(t0() + Duration::minutes(10)));
    }

    #[test]
    fn zero_window_flushes_any_nonempty_batch() {
        let mut batcher = RollupBatcher::new(50, Duration::zero());
        assert!(!batcher.should_flush(t0()));
        batcher.push(entry(1, 0), t0());
        let batch = batcher.try_flush(t0()).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batcher.is_empty());
        assert!(batcher.try_flush(t0()).is_none());
    }

    #[test]
    fn membership_and_oldest_time() {
        let mut batcher = RollupBatcher::new(10, Duration::zero());
        assert_eq!(batcher.oldest_kill_time(), None);
        batcher.push(entry(7, 4), t0());
        batcher.push(entry(8, 2), t0());
        assert_eq!(batcher.kill_ids().collect::<Vec<_>>(), vec![7, 8]);
        assert_eq!(batcher.oldest_kill_time(), Some(t0() + Duration::minutes(2)));
    }
}
