//! Tests for the event store.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use killwatch_core::{AttackerSummary, EnrichmentDetail, EnrichmentState, Killmail};

use super::*;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn kill(id: i64, secs: i64, system: i64, value: f64) -> Killmail {
    Killmail {
        kill_id: id,
        kill_time: base_time() + chrono::Duration::seconds(secs),
        solar_system_id: system,
        victim_ship_type_id: 587,
        victim_corporation_id: Some(98_000_000 + id),
        victim_alliance_id: None,
        attackers: AttackerSummary {
            count: 4,
            corporation_ids: BTreeSet::from([98_100_001]),
            alliance_ids: BTreeSet::from([99_000_010]),
            ship_type_ids: BTreeSet::from([621, 11993]),
        },
        final_blow_ship_type_id: Some(621),
        total_value: value,
        is_pod_kill: false,
        hash: format!("hash{id}"),
    }
}

#[tokio::test]
async fn insert_and_read_back() {
    let store = EventStore::in_memory().await.unwrap();
    let km = kill(1, 0, 30002187, 1.5e7);
    assert!(store.insert_kill(&km).await.unwrap());

    let loaded = store.get_kill(1).await.unwrap().unwrap();
    assert_eq!(loaded, km);
    assert!(store.get_kill(2).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_insert_is_silent_noop() {
    let store = EventStore::in_memory().await.unwrap();
    let km = kill(1, 0, 30002187, 1.0);
    assert!(store.insert_kill(&km).await.unwrap());
    assert!(!store.insert_kill(&km).await.unwrap());

    let batch = vec![kill(1, 0, 30002187, 1.0), kill(2, 5, 30002187, 1.0), kill(2, 5, 30002187, 1.0)];
    let inserted = store.insert_kills_batch(&batch).await.unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(store.get_stats().await.unwrap().kills, 2);
}

#[tokio::test]
async fn batch_skips_invalid_rows() {
    let store = EventStore::in_memory().await.unwrap();
    let mut bad = kill(3, 0, 1, 1.0);
    bad.hash.clear();
    let inserted = store
        .insert_kills_batch(&[kill(1, 0, 1, 1.0), bad])
        .await
        .unwrap();
    assert_eq!(inserted, 1);
}

#[tokio::test]
async fn insert_rejects_invalid_killmail() {
    let store = EventStore::in_memory().await.unwrap();
    let mut bad = kill(1, 0, 1, 1.0);
    bad.total_value = -5.0;
    assert!(matches!(
        store.insert_kill(&bad).await,
        Err(StoreError::Invalid(_))
    ));
}

#[tokio::test]
async fn cursor_pages_cover_everything_once() {
    let store = EventStore::in_memory().await.unwrap();
    // Several kills share a timestamp so the kill_id tiebreak is exercised.
    let kills: Vec<Killmail> = (1..=57).map(|i| kill(i, i / 4, 30000142, i as f64)).collect();
    store.insert_kills_batch(&kills).await.unwrap();

    let filter = KillFilter::default();
    let unbounded = store.query_kills(&filter, None, 1000).await.unwrap();
    assert_eq!(unbounded.kills.len(), 57);
    assert!(unbounded.next.is_none());

    let mut paged = Vec::new();
    let mut cursor = None;
    loop {
        let page = store.query_kills(&filter, cursor, 10).await.unwrap();
        paged.extend(page.kills);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let ids: Vec<i64> = paged.iter().map(|k| k.kill_id).collect();
    let expected: Vec<i64> = unbounded.kills.iter().map(|k| k.kill_id).collect();
    assert_eq!(ids, expected);

    // Newest first, id descending within a timestamp.
    for pair in paged.windows(2) {
        assert!((pair[0].kill_time, pair[0].kill_id) > (pair[1].kill_time, pair[1].kill_id));
    }
}

#[tokio::test]
async fn query_filters_apply() {
    let store = EventStore::in_memory().await.unwrap();
    store
        .insert_kills_batch(&[
            kill(1, 0, 100, 5.0e6),
            kill(2, 60, 100, 5.0e8),
            kill(3, 120, 200, 5.0e8),
            kill(4, 180, 100, 9.0e8),
        ])
        .await
        .unwrap();

    let filter = KillFilter {
        systems: BTreeSet::from([100]),
        since: Some(base_time() + chrono::Duration::seconds(30)),
        until: Some(base_time() + chrono::Duration::seconds(180)),
        min_value: Some(1.0e8),
    };
    let page = store.query_kills(&filter, None, 10).await.unwrap();
    let ids: Vec<i64> = page.kills.iter().map(|k| k.kill_id).collect();
    assert_eq!(ids, vec![2]);

    let empty = store.query_kills(&filter, None, 0).await.unwrap();
    assert!(empty.kills.is_empty());
}

#[tokio::test]
async fn system_window_is_oldest_first() {
    let store = EventStore::in_memory().await.unwrap();
    store
        .insert_kills_batch(&[kill(2, 60, 100, 1.0), kill(1, 0, 100, 1.0), kill(3, 30, 200, 1.0)])
        .await
        .unwrap();
    let window = store
        .kills_in_system_window(100, base_time(), base_time() + chrono::Duration::minutes(10))
        .await
        .unwrap();
    let ids: Vec<i64> = window.iter().map(|k| k.kill_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(
        store
            .count_kills_in_system(100, base_time(), base_time() + chrono::Duration::minutes(10))
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn huge_claim_ttl_never_goes_stale() {
    let store = EventStore::in_memory()
        .await
        .unwrap()
        .with_claim_ttl(Duration::from_secs(i64::MAX as u64 / 1000));
    store.insert_kill(&kill(1, 0, 1, 1.0)).await.unwrap();

    assert!(store.try_claim_enrichment_at(1, "alpha", base_time()).await.unwrap());
    let next_year = base_time() + chrono::Duration::days(365);
    assert!(!store.try_claim_enrichment_at(1, "beta", next_year).await.unwrap());
}

#[tokio::test]
async fn claim_is_exclusive_until_release_or_expiry() {
    let store = EventStore::in_memory()
        .await
        .unwrap()
        .with_claim_ttl(Duration::from_secs(60));
    store.insert_kill(&kill(1, 0, 1, 1.0)).await.unwrap();
    let now = base_time();

    assert!(store.try_claim_enrichment_at(1, "alpha", now).await.unwrap());
    assert!(!store.try_claim_enrichment_at(1, "beta", now).await.unwrap());
    // Re-claiming one's own lease refreshes it.
    assert!(store.try_claim_enrichment_at(1, "alpha", now).await.unwrap());

    // Not yet stale.
    let later = now + chrono::Duration::seconds(30);
    assert!(!store.try_claim_enrichment_at(1, "beta", later).await.unwrap());

    // Stale after the TTL.
    let much_later = now + chrono::Duration::seconds(61);
    assert!(store.try_claim_enrichment_at(1, "beta", much_later).await.unwrap());
    assert_eq!(store.claim_holder(1).await.unwrap().as_deref(), Some("beta"));

    // Only the holder can release.
    assert!(!store.release_claim(1, "alpha").await.unwrap());
    assert!(store.release_claim(1, "beta").await.unwrap());
    assert!(store.try_claim_enrichment_at(1, "gamma", much_later).await.unwrap());
}

#[tokio::test]
async fn enrichment_is_write_once() {
    let store = EventStore::in_memory().await.unwrap();
    store.insert_kill(&kill(1, 0, 1, 1.0)).await.unwrap();
    assert_eq!(store.enrichment_state(1).await.unwrap(), EnrichmentState::Pending);

    let detail = EnrichmentDetail {
        victim_character_id: Some(9001),
        attacker_character_ids: vec![1, 2, 3],
        damage_taken: 4200,
        ..Default::default()
    };
    assert!(store.store_enrichment(1, &detail).await.unwrap());
    assert!(!store.mark_unfetchable(1, "404").await.unwrap());
    assert!(!store.store_enrichment(1, &EnrichmentDetail::default()).await.unwrap());
    assert_eq!(
        store.enrichment_state(1).await.unwrap(),
        EnrichmentState::Enriched(detail)
    );
}

#[tokio::test]
async fn unfetchable_is_terminal() {
    let store = EventStore::in_memory().await.unwrap();
    store.insert_kill(&kill(1, 0, 1, 1.0)).await.unwrap();
    assert!(store.mark_unfetchable(1, "not found").await.unwrap());
    assert_eq!(
        store.enrichment_state(1).await.unwrap(),
        EnrichmentState::Unfetchable {
            reason: "not found".to_string()
        }
    );
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.unfetchable, 1);
    assert_eq!(stats.enriched, 0);
}

#[tokio::test]
async fn fetch_failures_accumulate() {
    let store = EventStore::in_memory().await.unwrap();
    store.insert_kill(&kill(1, 0, 1, 1.0)).await.unwrap();
    assert_eq!(store.fetch_attempts(1).await.unwrap(), 0);
    assert_eq!(store.record_fetch_failure(1).await.unwrap(), 1);
    assert_eq!(store.record_fetch_failure(1).await.unwrap(), 2);
    assert_eq!(store.fetch_attempts(1).await.unwrap(), 2);
}

#[tokio::test]
async fn processed_ledger_is_per_worker() {
    let store = EventStore::in_memory().await.unwrap();
    store
        .insert_kills_batch(&[kill(1, 0, 1, 1.0), kill(2, 10, 1, 1.0), kill(3, 20, 1, 1.0)])
        .await
        .unwrap();

    store.mark_processed("alpha", 1).await.unwrap();
    store.mark_processed("alpha", 1).await.unwrap();
    assert!(store.is_processed("alpha", 1).await.unwrap());
    assert!(!store.is_processed("beta", 1).await.unwrap());

    let alpha = store.poll_unprocessed("alpha", base_time(), 10).await.unwrap();
    let ids: Vec<i64> = alpha.iter().map(|k| k.kill_id).collect();
    assert_eq!(ids, vec![2, 3]);

    let beta = store.poll_unprocessed("beta", base_time(), 2).await.unwrap();
    let ids: Vec<i64> = beta.iter().map(|k| k.kill_id).collect();
    assert_eq!(ids, vec![1, 2]);

    // Excluded ids do not use up the page.
    let beta = store
        .poll_unprocessed_excluding("beta", base_time(), 2, &[1, 2])
        .await
        .unwrap();
    let ids: Vec<i64> = beta.iter().map(|k| k.kill_id).collect();
    assert_eq!(ids, vec![3]);
}

#[tokio::test]
async fn checkpoint_round_trip() {
    let store = EventStore::in_memory().await.unwrap();
    let fresh = store.load_checkpoint("alpha").await.unwrap();
    assert_eq!(fresh, WorkerCheckpoint::new("alpha"));

    let cp = WorkerCheckpoint {
        worker_id: "alpha".to_string(),
        last_processed_time: Some(base_time()),
        last_poll_time: Some(base_time() + chrono::Duration::seconds(5)),
        consecutive_failures: 2,
    };
    store.save_checkpoint(&cp).await.unwrap();
    assert_eq!(store.load_checkpoint("alpha").await.unwrap(), cp);

    let reset = WorkerCheckpoint {
        consecutive_failures: 0,
        ..cp
    };
    store.save_checkpoint(&reset).await.unwrap();
    assert_eq!(store.load_checkpoint("alpha").await.unwrap().consecutive_failures, 0);
}

#[tokio::test]
async fn sweeps_are_independent() {
    let store = EventStore::in_memory().await.unwrap();
    store
        .insert_kills_batch(&[kill(1, 0, 1, 1.0), kill(2, 3600, 1, 1.0)])
        .await
        .unwrap();
    store.mark_unfetchable(1, "gone").await.unwrap();
    store.mark_processed("alpha", 2).await.unwrap();
    store
        .try_claim_enrichment_at(2, "alpha", base_time())
        .await
        .unwrap();

    let deleted = store
        .expunge_before(base_time() + chrono::Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.kills, 1);
    // Enrichment for the expunged kill cascaded away.
    assert_eq!(stats.unfetchable, 0);
    assert_eq!(stats.processed_markers, 1);
    assert_eq!(stats.active_claims, 1);

    // The claim was taken at a fixed past time, so it is stale by now.
    assert_eq!(store.expunge_stale_claims(Duration::from_secs(60)).await.unwrap(), 1);
    assert_eq!(store.expunge_processed_kills(Utc::now() - chrono::Duration::hours(1)).await.unwrap(), 0);
    assert_eq!(store.expunge_processed_kills(Utc::now() + chrono::Duration::seconds(1)).await.unwrap(), 1);

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.active_claims, 0);
    assert_eq!(stats.processed_markers, 0);
    assert!(stats.size_bytes > 0);
}
