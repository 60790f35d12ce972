//! Serialization and reentrancy.
//!
//! A `TransferHook` on the token calls back into the ledger while a
//! transfer is in flight, the way a receiving contract could.

mod common;

use std::sync::{Arc, Mutex, OnceLock, Weak};

use async_trait::async_trait;
use common::*;
use escrow_core::{in_ledger_call, LedgerError, TransferHook, TransferKind, TransferNotice};
use futures::future::join_all;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    /// Nested mutating call outcome, as an error code or "ok"
    Nested(TransferKind, String),
    /// Whether engagement 0 read as completed during the push
    CompletedDuringPush(bool),
    MarkerSet(bool),
}

#[derive(Default)]
struct CallbackIntoLedger {
    ledger: OnceLock<Weak<MemoryLedger>>,
    seen: Mutex<Vec<Seen>>,
}

impl CallbackIntoLedger {
    fn record(&self, seen: Seen) {
        self.seen.lock().unwrap().push(seen);
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

fn outcome<T>(result: Result<T, LedgerError>) -> String {
    match result {
        Ok(_) => "ok".to_string(),
        Err(e) => e.code().to_string(),
    }
}

#[async_trait]
impl TransferHook for CallbackIntoLedger {
    async fn on_transfer(&self, notice: &TransferNotice) {
        let Some(ledger) = self.ledger.get().and_then(Weak::upgrade) else {
            return;
        };
        self.record(Seen::MarkerSet(in_ledger_call()));

        match notice.kind {
            TransferKind::Pull => {
                let nested = ledger.create_engagement(notice.from, AGENT_X, 1).await;
                self.record(Seen::Nested(TransferKind::Pull, outcome(nested)));
            }
            TransferKind::Push => {
                let completed = ledger
                    .get_engagement(0)
                    .await
                    .map(|e| e.is_completed)
                    .unwrap_or(false);
                self.record(Seen::CompletedDuringPush(completed));

                let nested = ledger.complete_engagement(ADMIN, 0).await;
                self.record(Seen::Nested(TransferKind::Push, outcome(nested)));

                let register = ledger.register_agent(ADMIN, AGENT_Y, "late", 1).await;
                self.record(Seen::Nested(TransferKind::Push, outcome(register)));
            }
        }
    }
}

async fn hooked() -> (Harness, Arc<CallbackIntoLedger>) {
    let h = Harness::new().await;
    let hook = Arc::new(CallbackIntoLedger::default());
    hook.ledger.set(Arc::downgrade(&h.ledger)).ok();
    h.token.set_hook(hook.clone());
    (h, hook)
}

#[tokio::test]
async fn nested_create_during_pull_is_refused() {
    let (h, hook) = hooked().await;
    h.register(AGENT_X, 100).await;
    h.fund(CLIENT, 1_000, 1_000);

    let receipt = h.ledger.create_engagement(CLIENT, AGENT_X, 2).await.unwrap();
    assert_eq!(receipt.engagement_id, 0);

    assert_eq!(
        hook.seen(),
        vec![
            Seen::MarkerSet(true),
            Seen::Nested(TransferKind::Pull, "ReentrantCall".to_string()),
        ]
    );
    // exactly one pull happened and one id was used
    assert_eq!(h.balance(CLIENT).await, 800);
    assert_eq!(h.ledger.next_engagement_id().await, 1);
}

#[tokio::test]
async fn nested_settlement_during_push_is_refused() {
    let (h, hook) = hooked().await;
    h.register(AGENT_X, 100).await;
    h.fund(CLIENT, 1_000, 1_000);
    h.token.clear_hook();
    h.ledger.create_engagement(CLIENT, AGENT_X, 3).await.unwrap();
    h.token.set_hook(hook.clone());

    h.ledger.complete_engagement(AGENT_X, 0).await.unwrap();

    assert_eq!(
        hook.seen(),
        vec![
            Seen::MarkerSet(true),
            Seen::CompletedDuringPush(true),
            Seen::Nested(TransferKind::Push, "ReentrantCall".to_string()),
            Seen::Nested(TransferKind::Push, "ReentrantCall".to_string()),
        ]
    );
    // released once
    assert_eq!(h.balance(AGENT_X).await, 300);
    assert_eq!(h.balance(CUSTODY).await, 0);
    assert_eq!(h.ledger.get_agent_details(&AGENT_X).await.total_earnings, 300);
    assert!(!h.ledger.get_agent_details(&AGENT_Y).await.is_active);
}

#[tokio::test]
async fn ledger_is_usable_after_refused_reentry() {
    let (h, _hook) = hooked().await;
    h.register(AGENT_X, 100).await;
    h.fund(CLIENT, 1_000, 1_000);
    h.ledger.create_engagement(CLIENT, AGENT_X, 1).await.unwrap();
    h.token.clear_hook();

    assert!(!in_ledger_call());
    h.ledger.complete_engagement(AGENT_X, 0).await.unwrap();
    h.ledger.register_agent(ADMIN, AGENT_Y, "ops", 9).await.unwrap();
    assert_eq!(h.ledger.flush().await.unwrap(), 0);
}

/// Hands the follow-up mutation to another task instead of awaiting it.
#[derive(Default)]
struct SpawnIntoLedger {
    ledger: OnceLock<Weak<MemoryLedger>>,
    spawned: Mutex<Option<JoinHandle<Result<(), LedgerError>>>>,
}

#[async_trait]
impl TransferHook for SpawnIntoLedger {
    async fn on_transfer(&self, notice: &TransferNotice) {
        let Some(ledger) = self.ledger.get().and_then(Weak::upgrade) else {
            return;
        };
        if notice.kind != TransferKind::Push {
            return;
        }
        let handle = tokio::spawn(async move {
            ledger
                .register_agent(ADMIN, AGENT_Y, "follow-up", 1)
                .await
                .map(|_| ())
        });
        *self.spawned.lock().unwrap() = Some(handle);
    }
}

#[tokio::test]
async fn spawned_mutation_from_hook_runs_after_the_outer_call() {
    let h = Harness::new().await;
    h.register(AGENT_X, 100).await;
    h.fund(CLIENT, 1_000, 1_000);
    h.ledger.create_engagement(CLIENT, AGENT_X, 1).await.unwrap();

    let hook = Arc::new(SpawnIntoLedger::default());
    hook.ledger.set(Arc::downgrade(&h.ledger)).ok();
    h.token.set_hook(hook.clone());

    h.ledger.complete_engagement(AGENT_X, 0).await.unwrap();
    h.token.clear_hook();

    let handle = hook.spawned.lock().unwrap().take().unwrap();
    handle.await.unwrap().unwrap();
    assert!(h.ledger.get_agent_details(&AGENT_Y).await.is_active);
    assert_eq!(
        h.stored_event_kinds().await,
        vec![
            "agent_registered",
            "engagement_created",
            "engagement_completed",
            "payment_released",
            "agent_registered",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_hires_are_serialized_not_refused() {
    let h = Harness::new().await;
    h.register(AGENT_X, 10).await;
    let clients: Vec<_> = (0u8..16).map(|n| addr(150 + n)).collect();
    for client in &clients {
        h.fund(*client, 100, 100);
    }

    let tasks = clients.iter().map(|client| {
        let ledger = h.ledger.clone();
        let client = *client;
        tokio::spawn(async move { ledger.create_engagement(client, AGENT_X, 2).await })
    });
    let receipts: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let mut ids: Vec<u64> = receipts.iter().map(|r| r.engagement_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..16).collect::<Vec<_>>());
    assert_eq!(h.balance(CUSTODY).await, 16 * 20);
    assert_eq!(h.ledger.reconcile_custody().await.unwrap(), 320);
    h.ledger.verify_event_log().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_settlements_release_once() {
    let h = Harness::new().await;
    h.register(AGENT_X, 50).await;
    h.fund(CLIENT, 1_000, 1_000);
    h.ledger.create_engagement(CLIENT, AGENT_X, 2).await.unwrap();

    let tasks = (0..8).map(|n| {
        let ledger = h.ledger.clone();
        let caller = if n % 2 == 0 { AGENT_X } else { ADMIN };
        tokio::spawn(async move { ledger.complete_engagement(caller, 0).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert_eq!(err, LedgerError::EngagementAlreadyCompleted(0));
    }
    assert_eq!(h.balance(AGENT_X).await, 100);
}
