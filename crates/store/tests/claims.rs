//! Claim exclusivity across independent store handles sharing one database file.

use std::collections::BTreeSet;

use chrono::Utc;
use killwatch_core::{AttackerSummary, Killmail};
use killwatch_store::EventStore;

fn sample_kill(id: i64) -> Killmail {
    Killmail {
        kill_id: id,
        kill_time: Utc::now(),
        solar_system_id: 30002187,
        victim_ship_type_id: 670,
        victim_corporation_id: Some(98_000_001),
        victim_alliance_id: None,
        attackers: AttackerSummary {
            count: 1,
            corporation_ids: BTreeSet::from([98_000_002]),
            alliance_ids: BTreeSet::new(),
            ship_type_ids: BTreeSet::from([587]),
        },
        final_blow_ship_type_id: Some(587),
        total_value: 10_000.0,
        is_pod_kill: true,
        hash: "abc123".to_string(),
    }
}

#[tokio::test]
async fn concurrent_claims_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("killwatch.db");

    let first = EventStore::open(&path, 4).await.unwrap();
    let second = EventStore::open(&path, 4).await.unwrap();
    first.insert_kill(&sample_kill(77)).await.unwrap();

    let (a, b) = tokio::join!(
        first.try_claim_enrichment(77, "worker-a"),
        second.try_claim_enrichment(77, "worker-b"),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a ^ b, "exactly one claim must win (a={a}, b={b})");

    let winner = if a { "worker-a" } else { "worker-b" };
    assert_eq!(first.claim_holder(77).await.unwrap().as_deref(), Some(winner));

    assert!(second.release_claim(77, winner).await.unwrap());
    assert!(first.try_claim_enrichment(77, "worker-c").await.unwrap());

    first.close().await;
    second.close().await;
}

#[tokio::test]
async fn reopen_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("killwatch.db");

    {
        let store = EventStore::open(&path, 2).await.unwrap();
        assert!(store.insert_kill(&sample_kill(5)).await.unwrap());
        store.mark_processed("alpha", 5).await.unwrap();
        store.close().await;
    }

    let store = EventStore::open(&path, 2).await.unwrap();
    assert!(store.get_kill(5).await.unwrap().is_some());
    assert!(store.is_processed("alpha", 5).await.unwrap());
    assert!(!store.insert_kill(&sample_kill(5)).await.unwrap());
}
