//! Contract tests for LedgerStore.
//!
//! Every check is written once against the trait and run against both the
//! in-memory fake and the SurrealDB implementation.

use chrono::Utc;
use escrow_state::fakes::MemoryLedgerStore;
use escrow_state::{
    verify_chain, AccountId, AgentRecord, EngagementRecord, EventDigest, EventRecord,
    LedgerBatch, LedgerEvent, LedgerStore, StorageError, SurrealLedgerStore, MAX_BALANCE,
};

fn agent(n: u64, rate: u64) -> AgentRecord {
    AgentRecord {
        wallet_address: AccountId::from_low_u64(n),
        agent_type: "research".to_string(),
        rate_per_day: rate,
        is_active: true,
        total_earnings: 0,
        registered_at: Some(Utc::now()),
    }
}

fn engagement(id: u64, payment: u64) -> EngagementRecord {
    EngagementRecord {
        engagement_id: id,
        user: AccountId::from_low_u64(100),
        agent: AccountId::from_low_u64(1),
        start_time: Utc::now(),
        duration_days: 3,
        payment,
        is_active: true,
        is_completed: false,
        completed_at: None,
    }
}

fn sealed(seq: u64, prev: &EventDigest, event: LedgerEvent) -> EventRecord {
    EventRecord::seal(seq, event, prev, Utc::now()).unwrap()
}

fn registration_batch(n: u64, seq: u64, prev: &EventDigest) -> LedgerBatch {
    let record = agent(n, 100);
    LedgerBatch {
        events: vec![sealed(
            seq,
            prev,
            LedgerEvent::AgentRegistered {
                agent: record.wallet_address,
                agent_type: record.agent_type.clone(),
                rate_per_day: record.rate_per_day,
            },
        )],
        agents: vec![record],
        ..LedgerBatch::default()
    }
}

// ===========================================================================
// Contracts
// ===========================================================================

async fn empty_store_loads_empty_snapshot<S: LedgerStore>(store: S) {
    let snapshot = store.load().await.unwrap();
    assert!(snapshot.agents.is_empty());
    assert!(snapshot.engagements.is_empty());
    assert_eq!(snapshot.next_engagement_id, 0);
    assert!(store.events(0).await.unwrap().is_empty());
}

async fn committed_batch_is_visible<S: LedgerStore>(store: S) {
    let batch = registration_batch(1, 0, &EventDigest::genesis());
    let expected_agent = batch.agents[0].clone();
    store.commit(batch).await.unwrap();

    let snapshot = store.load().await.unwrap();
    assert_eq!(snapshot.agents, vec![expected_agent]);

    let events = store.events(0).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.kind(), "agent_registered");
}

async fn upsert_replaces_existing_rows<S: LedgerStore>(store: S) {
    let open = engagement(0, 300);
    store
        .commit(LedgerBatch {
            engagements: vec![open.clone()],
            next_engagement_id: Some(1),
            ..LedgerBatch::default()
        })
        .await
        .unwrap();

    let mut settled = open.clone();
    settled.is_active = false;
    settled.is_completed = true;
    settled.completed_at = Some(Utc::now());
    let mut earner = agent(1, 100);
    earner.total_earnings = 300;

    store
        .commit(LedgerBatch {
            engagements: vec![settled.clone()],
            agents: vec![earner.clone()],
            ..LedgerBatch::default()
        })
        .await
        .unwrap();

    let snapshot = store.load().await.unwrap();
    assert_eq!(snapshot.engagements.len(), 1);
    assert!(snapshot.engagements[0].is_completed);
    assert!(!snapshot.engagements[0].is_active);
    assert_eq!(snapshot.agents[0].total_earnings, 300);
    assert_eq!(snapshot.next_engagement_id, 1);
}

async fn out_of_sequence_batch_writes_nothing<S: LedgerStore>(store: S) {
    let genesis = EventDigest::genesis();
    store
        .commit(registration_batch(1, 0, &genesis))
        .await
        .unwrap();

    // seq 5 does not continue a log of length 1
    let err = store
        .commit(registration_batch(2, 5, &genesis))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StorageError::SequenceConflict {
            expected: 1,
            found: 5
        }
    );

    let snapshot = store.load().await.unwrap();
    assert_eq!(snapshot.agents.len(), 1);
    assert_eq!(store.events(0).await.unwrap().len(), 1);
}

async fn events_are_ordered_and_filtered<S: LedgerStore>(store: S) {
    let mut prev = EventDigest::genesis();
    for seq in 0..4 {
        let batch = registration_batch(seq + 1, seq, &prev);
        prev = batch.events[0].digest.clone();
        store.commit(batch).await.unwrap();
    }

    let all = store.events(0).await.unwrap();
    let seqs: Vec<u64> = all.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
    assert_eq!(verify_chain(&all).unwrap(), prev);

    let tail = store.events(2).await.unwrap();
    assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3]);
}

async fn oversized_amount_writes_nothing<S: LedgerStore>(store: S) {
    let mut batch = registration_batch(1, 0, &EventDigest::genesis());
    batch.agents[0].rate_per_day = MAX_BALANCE + 1;
    let err = store.commit(batch).await.unwrap_err();
    assert_eq!(
        err,
        StorageError::OutOfRange {
            field: "rate_per_day",
            value: MAX_BALANCE + 1
        }
    );

    // the bound itself round-trips exactly
    let mut rich = engagement(0, MAX_BALANCE);
    rich.duration_days = 1;
    store
        .commit(LedgerBatch {
            engagements: vec![rich],
            next_engagement_id: Some(1),
            ..LedgerBatch::default()
        })
        .await
        .unwrap();

    let snapshot = store.load().await.unwrap();
    assert!(snapshot.agents.is_empty());
    assert_eq!(snapshot.engagements[0].payment, MAX_BALANCE);
    assert!(store.events(0).await.unwrap().is_empty());
}

async fn empty_batch_is_noop<S: LedgerStore>(store: S) {
    store.commit(LedgerBatch::new()).await.unwrap();
    assert!(store.events(0).await.unwrap().is_empty());
}

// ===========================================================================
// MemoryLedgerStore
// ===========================================================================

mod memory {
    use super::*;

    #[tokio::test]
    async fn empty_snapshot() {
        empty_store_loads_empty_snapshot(MemoryLedgerStore::new()).await;
    }

    #[tokio::test]
    async fn commit_visible() {
        committed_batch_is_visible(MemoryLedgerStore::new()).await;
    }

    #[tokio::test]
    async fn upsert() {
        upsert_replaces_existing_rows(MemoryLedgerStore::new()).await;
    }

    #[tokio::test]
    async fn sequence_conflict() {
        out_of_sequence_batch_writes_nothing(MemoryLedgerStore::new()).await;
    }

    #[tokio::test]
    async fn ordered_events() {
        events_are_ordered_and_filtered(MemoryLedgerStore::new()).await;
    }

    #[tokio::test]
    async fn empty_batch() {
        empty_batch_is_noop(MemoryLedgerStore::new()).await;
    }

    #[tokio::test]
    async fn oversized_amount() {
        oversized_amount_writes_nothing(MemoryLedgerStore::new()).await;
    }

    #[tokio::test]
    async fn injected_failure_writes_nothing() {
        let store = MemoryLedgerStore::new();
        store.fail_next_commit();

        let err = store
            .commit(registration_batch(1, 0, &EventDigest::genesis()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
        assert!(store.load().await.unwrap().agents.is_empty());
        assert_eq!(store.commit_count(), 0);

        // only the next commit fails
        store
            .commit(registration_batch(1, 0, &EventDigest::genesis()))
            .await
            .unwrap();
        assert_eq!(store.commit_count(), 1);
    }
}

// ===========================================================================
// SurrealLedgerStore
// ===========================================================================

mod surreal {
    use super::*;

    async fn store() -> SurrealLedgerStore {
        SurrealLedgerStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn empty_snapshot() {
        empty_store_loads_empty_snapshot(store().await).await;
    }

    #[tokio::test]
    async fn commit_visible() {
        committed_batch_is_visible(store().await).await;
    }

    #[tokio::test]
    async fn upsert() {
        upsert_replaces_existing_rows(store().await).await;
    }

    #[tokio::test]
    async fn sequence_conflict() {
        out_of_sequence_batch_writes_nothing(store().await).await;
    }

    #[tokio::test]
    async fn ordered_events() {
        events_are_ordered_and_filtered(store().await).await;
    }

    #[tokio::test]
    async fn empty_batch() {
        empty_batch_is_noop(store().await).await;
    }

    #[tokio::test]
    async fn oversized_amount() {
        oversized_amount_writes_nothing(store().await).await;
    }
}

// ===========================================================================
// SurrealLedgerStore on disk (SurrealKV)
// ===========================================================================

mod surrealkv {
    use super::*;
    use escrow_state::StoreConfig;

    async fn store(dir: &tempfile::TempDir) -> SurrealLedgerStore {
        SurrealLedgerStore::connect(&StoreConfig::local(dir.path().join("db")))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn commit_visible() {
        let dir = tempfile::tempdir().unwrap();
        committed_batch_is_visible(store(&dir).await).await;
    }

    #[tokio::test]
    async fn sequence_conflict() {
        let dir = tempfile::tempdir().unwrap();
        out_of_sequence_batch_writes_nothing(store(&dir).await).await;
    }

    #[tokio::test]
    async fn oversized_amount() {
        let dir = tempfile::tempdir().unwrap();
        oversized_amount_writes_nothing(store(&dir).await).await;
    }
}
