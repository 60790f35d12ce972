//! In-memory ledger state.
//!
//! `LedgerState` mirrors what the store holds plus the head of the event
//! hash chain. It only changes through [`LedgerState::apply`], which takes
//! the same `LedgerBatch` that is handed to the store, so memory and disk
//! are updated from one description of the change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use escrow_state::{
    verify_chain, AccountId, AgentRecord, Balance, EngagementId, EngagementRecord, EventDigest,
    EventRecord, LedgerBatch, LedgerEvent, LedgerSnapshot, StorageResult,
};

use crate::domain::{LedgerError, Result};

#[derive(Debug, Clone)]
pub struct LedgerState {
    agents: BTreeMap<AccountId, AgentRecord>,
    engagements: BTreeMap<EngagementId, EngagementRecord>,
    next_engagement_id: EngagementId,
    event_head: EventDigest,
    event_len: u64,
}

/// Values overwritten by one batch, enough to undo it.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    agents: Vec<(AccountId, Option<AgentRecord>)>,
    engagements: Vec<(EngagementId, Option<EngagementRecord>)>,
    next_engagement_id: EngagementId,
    event_head: EventDigest,
    event_len: u64,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            agents: BTreeMap::new(),
            engagements: BTreeMap::new(),
            next_engagement_id: 0,
            event_head: EventDigest::genesis(),
            event_len: 0,
        }
    }
}

impl LedgerState {
    /// Rebuild state from a stored snapshot and its full event log.
    pub fn restore_from(snapshot: LedgerSnapshot, events: &[EventRecord]) -> Result<Self> {
        let event_head = verify_chain(events)
            .map_err(|e| LedgerError::CorruptState(format!("event log: {e}")))?;

        let mut state = Self {
            next_engagement_id: snapshot.next_engagement_id,
            event_head,
            event_len: events.len() as u64,
            ..Self::default()
        };

        for agent in snapshot.agents {
            if agent.wallet_address.is_zero() {
                return Err(LedgerError::CorruptState(
                    "agent stored under the zero identity".to_string(),
                ));
            }
            state.agents.insert(agent.wallet_address, agent);
        }
        for engagement in snapshot.engagements {
            if engagement.engagement_id >= state.next_engagement_id {
                return Err(LedgerError::CorruptState(format!(
                    "engagement {} at or beyond counter {}",
                    engagement.engagement_id, state.next_engagement_id
                )));
            }
            if engagement.is_active && engagement.is_completed {
                return Err(LedgerError::CorruptState(format!(
                    "engagement {} both active and completed",
                    engagement.engagement_id
                )));
            }
            state.engagements.insert(engagement.engagement_id, engagement);
        }
        Ok(state)
    }

    // -- reads ---------------------------------------------------------------

    pub fn agent(&self, identity: &AccountId) -> Option<&AgentRecord> {
        self.agents.get(identity)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values()
    }

    pub fn engagement(&self, id: EngagementId) -> Option<&EngagementRecord> {
        self.engagements.get(&id)
    }

    pub fn engagements(&self) -> impl Iterator<Item = &EngagementRecord> {
        self.engagements.values()
    }

    pub fn next_engagement_id(&self) -> EngagementId {
        self.next_engagement_id
    }

    pub fn event_head(&self) -> &EventDigest {
        &self.event_head
    }

    pub fn event_len(&self) -> u64 {
        self.event_len
    }

    /// Sum of `payment` over active engagements.
    pub fn escrowed_total(&self) -> Balance {
        self.engagements
            .values()
            .filter(|e| e.is_active)
            .fold(0, |acc: Balance, e| acc.saturating_add(e.payment))
    }

    // -- writes --------------------------------------------------------------

    /// Seal `events` onto the current head without changing state.
    pub fn seal(
        &self,
        events: Vec<LedgerEvent>,
        recorded_at: DateTime<Utc>,
    ) -> StorageResult<Vec<EventRecord>> {
        let mut head = self.event_head.clone();
        let mut sealed = Vec::with_capacity(events.len());
        for (seq, event) in (self.event_len..).zip(events) {
            let record = EventRecord::seal(seq, event, &head, recorded_at)?;
            head = record.digest.clone();
            sealed.push(record);
        }
        Ok(sealed)
    }

    pub fn apply(&mut self, batch: &LedgerBatch) {
        for agent in &batch.agents {
            self.agents.insert(agent.wallet_address, agent.clone());
        }
        for engagement in &batch.engagements {
            self.engagements
                .insert(engagement.engagement_id, engagement.clone());
        }
        if let Some(next) = batch.next_engagement_id {
            self.next_engagement_id = next;
        }
        if let Some(last) = batch.events.last() {
            self.event_head = last.digest.clone();
            self.event_len = last.seq + 1;
        }
    }

    /// Capture everything `batch` would overwrite.
    pub fn checkpoint(&self, batch: &LedgerBatch) -> Checkpoint {
        Checkpoint {
            agents: batch
                .agents
                .iter()
                .map(|a| (a.wallet_address, self.agents.get(&a.wallet_address).cloned()))
                .collect(),
            engagements: batch
                .engagements
                .iter()
                .map(|e| (e.engagement_id, self.engagements.get(&e.engagement_id).cloned()))
                .collect(),
            next_engagement_id: self.next_engagement_id,
            event_head: self.event_head.clone(),
            event_len: self.event_len,
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        for (identity, previous) in checkpoint.agents {
            match previous {
                Some(record) => self.agents.insert(identity, record),
                None => self.agents.remove(&identity),
            };
        }
        for (id, previous) in checkpoint.engagements {
            match previous {
                Some(record) => self.engagements.insert(id, record),
                None => self.engagements.remove(&id),
            };
        }
        self.next_engagement_id = checkpoint.next_engagement_id;
        self.event_head = checkpoint.event_head;
        self.event_len = checkpoint.event_len;
    }
}
