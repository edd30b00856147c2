//! Rate-limit cooldown with a bounded queue of deferred notifications.
//!
//! A `RateLimited { retry_after }` answer trips the cooldown until
//! `now + retry_after + extra`. `extra` starts at zero and doubles (from
//! `base_backoff`, capped at `max_backoff`) each time the endpoint limits us
//! again before a send succeeds.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use killwatch_notify::webhook::MAX_RETRY_AFTER_SECS;

#[derive(Debug)]
pub struct Cooldown<T> {
    until: Option<DateTime<Utc>>,
    extra: Duration,
    base_backoff: Duration,
    max_backoff: Duration,
    pending: VecDeque<T>,
    limit: usize,
}

impl<T> Cooldown<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            until: None,
            extra: Duration::zero(),
            base_backoff: Duration::seconds(5),
            max_backoff: Duration::minutes(10),
            pending: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.until
    }

    /// Start (or extend) the cooldown after a rate-limit answer. Never ends
    /// earlier than `now + retry_after_secs`, with the delay capped at
    /// [`MAX_RETRY_AFTER_SECS`].
    pub fn trip(&mut self, retry_after_secs: u64, now: DateTime<Utc>) -> DateTime<Utc> {
        let retry_after_secs = retry_after_secs.min(MAX_RETRY_AFTER_SECS);
        let retry_after = Duration::seconds(retry_after_secs as i64);
        let repeated = self.until.is_some();
        if repeated {
            self.extra = if self.extra.is_zero() {
                self.base_backoff
            } else {
                (self.extra * 2).min(self.max_backoff)
            };
        }
        let until = now
            .checked_add_signed(retry_after + self.extra)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.until = Some(self.until.map_or(until, |prev| prev.max(until)));
        warn!(
            retry_after_secs,
            extra_backoff_secs = self.extra.num_seconds(),
            until = %until,
            queued = self.pending.len(),
            "rate limited; cooling down"
        );
        until
    }

    /// A send went through; forget the backoff history.
    pub fn record_success(&mut self) {
        if self.until.take().is_some() {
            info!(queued = self.pending.len(), "rate limit cleared");
        }
        self.extra = Duration::zero();
    }

    /// Queue an item, returning the oldest one when the bound is exceeded.
    pub fn enqueue(&mut self, item: T) -> Option<T> {
        self.pending.push_back(item);
        if self.pending.len() > self.limit {
            let dropped = self.pending.pop_front();
            warn!(limit = self.limit, "pending queue full; dropping oldest notification");
            dropped
        } else {
            None
        }
    }

    /// Oldest queued item, once the cooldown has expired.
    pub fn pop_ready(&mut self, now: DateTime<Utc>) -> Option<T> {
        if self.is_active(now) {
            return None;
        }
        self.pending.pop_front()
    }

    /// Put an item back at the head after a failed flush attempt.
    pub fn requeue_front(&mut self, item: T) {
        self.pending.push_front(item);
    }

    pub fn pending(&self) -> impl Iterator<Item = &T> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn cooldown_lasts_at_least_retry_after() {
        let mut cd: Cooldown<u32> = Cooldown::new(10);
        let until = cd.trip(60, t0());
        assert!(until >= t0() + Duration::seconds(60));
        assert!(cd.is_active(t0() + Duration::seconds(59)));
        assert!(!cd.is_active(t0() + Duration::seconds(60)));
    }

    #[test]
    fn queued_items_flush_oldest_first_after_expiry() {
        let mut cd = Cooldown::new(10);
        cd.trip(60, t0());
        cd.enqueue(1);
        cd.enqueue(2);
        assert_eq!(cd.pop_ready(t0() + Duration::seconds(30)), None);

        let later = t0() + Duration::seconds(61);
        assert_eq!(cd.pop_ready(later), Some(1));
        cd.requeue_front(1);
        assert_eq!(cd.pop_ready(later), Some(1));
        assert_eq!(cd.pop_ready(later), Some(2));
        assert!(cd.is_empty());
    }

    #[test]
    fn repeated_limiting_doubles_extra_backoff() {
        let mut cd: Cooldown<u32> =
            Cooldown::new(10).with_backoff(Duration::seconds(5), Duration::seconds(15));
        let first = cd.trip(10, t0());
        assert_eq!(first, t0() + Duration::seconds(10));

        let second = cd.trip(10, t0() + Duration::seconds(10));
        assert_eq!(second, t0() + Duration::seconds(25));

        let third = cd.trip(10, t0() + Duration::seconds(25));
        assert_eq!(third, t0() + Duration::seconds(45));

        // capped
        let fourth = cd.trip(10, t0() + Duration::seconds(45));
        assert_eq!(fourth, t0() + Duration::seconds(70));

        cd.record_success();
        assert!(!cd.is_active(t0() + Duration::seconds(45)));
        let fresh = cd.trip(10, t0() + Duration::seconds(100));
        assert_eq!(fresh, t0() + Duration::seconds(110));
    }

    #[test]
    fn absurd_retry_after_is_capped() {
        let mut cd: Cooldown<u32> = Cooldown::new(4);
        let until = cd.trip(10_000_000_000_000, t0());
        assert_eq!(until, t0() + Duration::seconds(MAX_RETRY_AFTER_SECS as i64));

        let again = cd.trip(u64::MAX, DateTime::<Utc>::MAX_UTC - Duration::seconds(1));
        assert_eq!(again, DateTime::<Utc>::MAX_UTC);
        assert!(cd.is_active(t0() + Duration::days(1) - Duration::seconds(1)));
    }

    #[test]
    fn bounded_queue_drops_oldest() {
        let mut cd = Cooldown::new(2);
        assert_eq!(cd.enqueue('a'), None);
        assert_eq!(cd.enqueue('b'), None);
        assert_eq!(cd.enqueue('c'), Some('a'));
        assert_eq!(cd.pending().copied().collect::<Vec<_>>(), vec!['b', 'c']);
    }
}
