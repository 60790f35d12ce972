//! The escrow ledger service.
//!
//! [`EscrowLedger`] owns the serialization boundary. Every mutating call
//! (`register_agent`, `create_engagement`, `complete_engagement`, `flush`)
//! runs under the reentrancy marker and holds one `tokio::sync::Mutex` for
//! its whole duration, collaborator calls included. Reads only take the
//! state `RwLock` and never wait behind a running mutation's external call.
//!
//! Registry rules live in `registry`, engagement rules in `engagement`.

mod engagement;
pub mod guard;
mod registry;
pub mod state;

use std::collections::VecDeque;
use std::sync::Arc;

use escrow_state::{
    verify_chain, AccountId, AgentRecord, Balance, EngagementId, EngagementRecord, EventDigest,
    EventRecord, LedgerBatch, LedgerStore, StorageError,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

use crate::domain::{LedgerConfig, LedgerError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::token::ValueTransfer;

pub use state::LedgerState;

pub struct EscrowLedger<T, S> {
    token: Arc<T>,
    store: Arc<S>,
    config: LedgerConfig,
    /// Held for the full duration of every mutating call
    serial: Mutex<()>,
    state: RwLock<LedgerState>,
    /// Batches applied in memory whose store commit failed, oldest first
    pending: Mutex<VecDeque<LedgerBatch>>,
}

impl<T, S> EscrowLedger<T, S>
where
    T: ValueTransfer,
    S: LedgerStore,
{
    /// Open a ledger over `store`, moving value through `token`.
    ///
    /// Fails with `InvalidUsdtAddress` when the token reports the zero
    /// address, before the store is touched.
    #[instrument(skip_all, fields(admin = %config.admin, custody = %config.custody))]
    pub async fn open(token: Arc<T>, store: Arc<S>, config: LedgerConfig) -> Result<Self> {
        if token.address().is_zero() {
            return Err(LedgerError::InvalidUsdtAddress);
        }
        if config.admin.is_zero() {
            return Err(LedgerError::InvalidAdmin);
        }
        if config.custody.is_zero() {
            return Err(LedgerError::InvalidCustodyAccount);
        }

        let snapshot = store.load().await?;
        let events = store.events(0).await?;
        let state = LedgerState::restore_from(snapshot, &events)?;

        obs::emit_ledger_opened(
            &config.admin,
            &config.custody,
            state.agents().count(),
            state.engagements().count(),
        );
        Ok(Self {
            token,
            store,
            config,
            serial: Mutex::new(()),
            state: RwLock::new(state),
            pending: Mutex::new(VecDeque::new()),
        })
    }

    // -- identities ----------------------------------------------------------

    pub fn admin(&self) -> AccountId {
        self.config.admin
    }

    pub fn custody_account(&self) -> AccountId {
        self.config.custody
    }

    pub fn token_address(&self) -> AccountId {
        self.token.address()
    }

    pub fn token(&self) -> &Arc<T> {
        &self.token
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // -- reads ---------------------------------------------------------------

    pub async fn get_engagement(&self, id: EngagementId) -> Option<EngagementRecord> {
        self.state.read().await.engagement(id).cloned()
    }

    /// Full registry entry, `None` for unknown identities.
    pub async fn agent(&self, identity: &AccountId) -> Option<AgentRecord> {
        self.state.read().await.agent(identity).cloned()
    }

    pub async fn engagements_for_agent(&self, agent: &AccountId) -> Vec<EngagementRecord> {
        self.state
            .read()
            .await
            .engagements()
            .filter(|e| &e.agent == agent)
            .cloned()
            .collect()
    }

    pub async fn engagements_for_user(&self, user: &AccountId) -> Vec<EngagementRecord> {
        self.state
            .read()
            .await
            .engagements()
            .filter(|e| &e.user == user)
            .cloned()
            .collect()
    }

    /// Id the next successful `create_engagement` will receive.
    pub async fn next_engagement_id(&self) -> EngagementId {
        self.state.read().await.next_engagement_id()
    }

    /// Head digest and length of the event chain as held in memory.
    pub async fn event_head(&self) -> (EventDigest, u64) {
        let state = self.state.read().await;
        (state.event_head().clone(), state.event_len())
    }

    /// Persisted events with `seq >= from_seq`.
    ///
    /// Events of batches still pending are not included until flushed.
    pub async fn events(&self, from_seq: u64) -> Result<Vec<EventRecord>> {
        Ok(self.store.events(from_seq).await?)
    }

    /// What the ledger believes custody holds: the sum of active payments.
    pub async fn custody_balance(&self) -> Balance {
        self.state.read().await.escrowed_total()
    }

    /// Compare [`custody_balance`](Self::custody_balance) with what the
    /// token reports for the custody account.
    pub async fn reconcile_custody(&self) -> Result<Balance> {
        let recorded = self.custody_balance().await;
        let held = self.token.balance_of(&self.config.custody).await?;
        if recorded != held {
            return Err(LedgerError::CustodyMismatch { recorded, held });
        }
        Ok(held)
    }

    /// Re-read the persisted event log, check its hash chain and compare
    /// its head with memory. Returns the verified head and length.
    pub async fn verify_event_log(&self) -> Result<(EventDigest, u64)> {
        let events = self.store.events(0).await?;
        let head = verify_chain(&events)
            .map_err(|e| LedgerError::CorruptState(format!("event log: {e}")))?;
        let len = events.len() as u64;

        if self.pending_batches().await == 0 {
            let (memory_head, memory_len) = self.event_head().await;
            if memory_head != head || memory_len != len {
                return Err(LedgerError::CorruptState(format!(
                    "persisted head {} at {len} differs from memory head {} at {memory_len}",
                    head.short(),
                    memory_head.short()
                )));
            }
        }
        Ok((head, len))
    }

    // -- durability ----------------------------------------------------------

    /// Number of applied batches still waiting for a store commit.
    pub async fn pending_batches(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Write queued batches to the store. Returns how many were written.
    pub async fn flush(&self) -> Result<usize> {
        guard::non_reentrant(async {
            let _serial = self.serial.lock().await;
            self.flush_pending().await
        })
        .await
    }

    /// Commit pending batches in order. Callers hold `serial`.
    async fn flush_pending(&self) -> Result<usize> {
        let mut pending = self.pending.lock().await;
        let mut flushed = 0;
        while let Some(batch) = pending.front() {
            match self.store.commit(batch.clone()).await {
                Ok(()) => {}
                Err(StorageError::SequenceConflict { expected, found })
                    if already_durable(batch, expected, found) =>
                {
                    debug!(found, expected, "pending batch already in store");
                }
                Err(e) => return Err(e.into()),
            }
            pending.pop_front();
            flushed += 1;
        }
        if flushed > 0 {
            obs::emit_pending_flushed(flushed);
        }
        Ok(flushed)
    }

    /// Commit a batch that is already applied in memory, queueing it when
    /// the store refuses. Callers hold `serial`.
    async fn persist_or_defer(&self, batch: LedgerBatch) {
        if let Err(e) = self.store.commit(batch.clone()).await {
            let first_seq = batch.events.first().map(|r| r.seq);
            let mut pending = self.pending.lock().await;
            pending.push_back(batch);
            METRICS.inc_commits_deferred();
            obs::emit_commit_deferred(first_seq, pending.len(), &e);
        }
    }

    fn rejected(&self, op: &str, caller: &AccountId, err: LedgerError) -> LedgerError {
        if err.is_precondition() {
            METRICS.inc_rejected();
            obs::emit_operation_rejected(op, caller, err.code());
        }
        err
    }
}

/// A retried batch conflicts with its own earlier, successful write when
/// the store's log already extends past every event in it.
fn already_durable(batch: &LedgerBatch, expected: u64, found: u64) -> bool {
    match batch.events.first() {
        Some(first) => first.seq == found && expected >= found + batch.events.len() as u64,
        None => false,
    }
}
