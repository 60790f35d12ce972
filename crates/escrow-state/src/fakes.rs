//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryLedgerStore`, which satisfies the `LedgerStore` contract
//! without any external dependencies and can be told to fail a commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Tables {
    agents: BTreeMap<AccountId, AgentRecord>,
    engagements: BTreeMap<EngagementId, EngagementRecord>,
    next_engagement_id: EngagementId,
    events: Vec<EventRecord>,
}

/// In-memory ledger store backed by ordered maps.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    tables: Mutex<Tables>,
    fail_next_commit: AtomicBool,
    commits: AtomicU64,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail with a backend error, writing nothing.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    fn tables(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> StorageResult<LedgerSnapshot> {
        let tables = self.tables()?;
        Ok(LedgerSnapshot {
            agents: tables.agents.values().cloned().collect(),
            engagements: tables.engagements.values().cloned().collect(),
            next_engagement_id: tables.next_engagement_id,
        })
    }

    async fn commit(&self, batch: LedgerBatch) -> StorageResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Backend(
                "injected commit failure".to_string(),
            ));
        }

        let mut tables = self.tables()?;
        // Validate before touching anything so a rejected batch writes nothing.
        batch.check_amounts()?;
        batch.check_sequence(tables.events.len() as u64)?;

        for agent in batch.agents {
            tables.agents.insert(agent.wallet_address, agent);
        }
        for engagement in batch.engagements {
            tables
                .engagements
                .insert(engagement.engagement_id, engagement);
        }
        if let Some(next) = batch.next_engagement_id {
            tables.next_engagement_id = next;
        }
        tables.events.extend(batch.events);

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn events(&self, from_seq: u64) -> StorageResult<Vec<EventRecord>> {
        let tables = self.tables()?;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.seq >= from_seq)
            .cloned()
            .collect())
    }
}
