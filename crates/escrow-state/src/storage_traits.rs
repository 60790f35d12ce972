//! Storage trait definitions for the escrow ledger
//!
//! These types define the persisted state surface:
//! - `AgentRecord`: the agent registry table, keyed by wallet address
//! - `EngagementRecord`: the engagement table, keyed by sequential id
//! - `EventRecord`: the append-only, hash-chained event log
//! - `LedgerStore`: atomic batch persistence over all of the above
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Amount in the smallest currency unit (6 fractional decimals).
pub type Balance = u64;

/// Largest amount a store keeps exactly. SurrealDB integers are signed
/// 64-bit, so anything above `i64::MAX` would come back negative.
pub const MAX_BALANCE: Balance = i64::MAX as Balance;

/// Sequential engagement identifier, starting at 0.
pub type EngagementId = u64;

// ---------------------------------------------------------------------------
// AccountId: 20-byte identity
// ---------------------------------------------------------------------------

/// A 20-byte identity (agent, client, administrator, custody or token).
///
/// Rendered and serialized as `0x`-prefixed lowercase hex. The all-zero
/// value is the null identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AccountId([u8; 20]);

impl AccountId {
    /// Byte length of an identity.
    pub const LEN: usize = 20;

    /// The null identity.
    pub const ZERO: AccountId = AccountId([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        AccountId(bytes)
    }

    /// Build an identity whose low 8 bytes hold `n` (big-endian).
    ///
    /// Handy for fixtures and local sandboxes.
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        AccountId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Short form (`0x` + first 8 hex chars), for log lines.
    pub fn short(&self) -> String {
        format!("0x{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let invalid = || StorageError::InvalidAccountId {
            value: s.to_string(),
        };
        let raw = hex::decode(trimmed).map_err(|_| invalid())?;
        let bytes: [u8; 20] = raw.try_into().map_err(|_| invalid())?;
        Ok(AccountId(bytes))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Registry and engagement records
// ---------------------------------------------------------------------------

/// Agent registry entry.
///
/// `Default` is the zero-valued record reported for unknown identities.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Registry key; non-zero once the agent exists
    pub wallet_address: AccountId,
    /// Free-form classification
    pub agent_type: String,
    /// Fee per day in the smallest unit
    pub rate_per_day: Balance,
    pub is_active: bool,
    /// Sum of all settled payments; never decreases
    pub total_earnings: Balance,
    pub registered_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    /// Whether this record was ever written (first-write-wins key).
    pub fn exists(&self) -> bool {
        !self.wallet_address.is_zero()
    }
}

/// Lifecycle position of an engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    Active,
    Completed,
}

/// A single hiring engagement with its fee held in custody
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub engagement_id: EngagementId,
    /// Hiring identity
    pub user: AccountId,
    pub agent: AccountId,
    pub start_time: DateTime<Utc>,
    pub duration_days: u64,
    /// `rate_per_day * duration_days`, fixed at creation
    pub payment: Balance,
    pub is_active: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EngagementRecord {
    pub fn status(&self) -> EngagementStatus {
        if self.is_completed {
            EngagementStatus::Completed
        } else {
            EngagementStatus::Active
        }
    }
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// A ledger state change, one per successful operation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    AgentRegistered {
        agent: AccountId,
        agent_type: String,
        rate_per_day: Balance,
    },
    EngagementCreated {
        engagement_id: EngagementId,
        user: AccountId,
        agent: AccountId,
        payment: Balance,
    },
    EngagementCompleted {
        engagement_id: EngagementId,
        payment: Balance,
    },
    PaymentReleased {
        agent: AccountId,
        amount: Balance,
    },
}

impl LedgerEvent {
    /// Stable kind label (matches the serialized tag).
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::AgentRegistered { .. } => "agent_registered",
            LedgerEvent::EngagementCreated { .. } => "engagement_created",
            LedgerEvent::EngagementCompleted { .. } => "engagement_completed",
            LedgerEvent::PaymentReleased { .. } => "payment_released",
        }
    }
}

/// SHA-256 link in the event hash chain (lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDigest(String);

impl EventDigest {
    /// The `prev_digest` of the first event.
    pub fn genesis() -> Self {
        EventDigest("0".repeat(64))
    }

    /// Digest of `seq` + `event` chained onto `prev`.
    pub fn compute(prev: &EventDigest, seq: u64, event: &LedgerEvent) -> StorageResult<Self> {
        let mut hasher = Sha256::new();
        hasher.update(prev.0.as_bytes());
        hasher.update(seq.to_be_bytes());
        hasher.update(serde_json::to_vec(event)?);
        Ok(EventDigest(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for EventDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(EventDigest(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for EventDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted event-log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the ledger-wide log, from 0
    pub seq: u64,
    pub event: LedgerEvent,
    pub recorded_at: DateTime<Utc>,
    pub prev_digest: EventDigest,
    pub digest: EventDigest,
}

impl EventRecord {
    /// Seal `event` at position `seq` on top of `prev`.
    pub fn seal(
        seq: u64,
        event: LedgerEvent,
        prev: &EventDigest,
        recorded_at: DateTime<Utc>,
    ) -> StorageResult<Self> {
        let digest = EventDigest::compute(prev, seq, &event)?;
        Ok(EventRecord {
            seq,
            event,
            recorded_at,
            prev_digest: prev.clone(),
            digest,
        })
    }
}

/// Check that `records` is a gap-free chain starting at seq 0.
///
/// Returns the head digest (genesis for an empty log).
pub fn verify_chain(records: &[EventRecord]) -> StorageResult<EventDigest> {
    let mut head = EventDigest::genesis();
    for (expected_seq, record) in (0u64..).zip(records) {
        if record.seq != expected_seq {
            return Err(StorageError::CorruptRecord(format!(
                "event log gap: expected seq {expected_seq}, found {}",
                record.seq
            )));
        }
        if record.prev_digest != head {
            return Err(StorageError::CorruptRecord(format!(
                "event {} does not link to its predecessor",
                record.seq
            )));
        }
        let recomputed = EventDigest::compute(&head, record.seq, &record.event)?;
        if recomputed != record.digest {
            return Err(StorageError::CorruptRecord(format!(
                "event {} digest mismatch",
                record.seq
            )));
        }
        head = recomputed;
    }
    Ok(head)
}

// ---------------------------------------------------------------------------
// LedgerStore: atomic persistence
// ---------------------------------------------------------------------------

/// Registry, engagement table and id counter as loaded from a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub agents: Vec<AgentRecord>,
    pub engagements: Vec<EngagementRecord>,
    pub next_engagement_id: EngagementId,
}

/// One operation's worth of writes, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerBatch {
    /// Upserted by `wallet_address`
    pub agents: Vec<AgentRecord>,
    /// Upserted by `engagement_id`
    pub engagements: Vec<EngagementRecord>,
    pub next_engagement_id: Option<EngagementId>,
    /// Appended; the first `seq` must equal the current log length
    pub events: Vec<EventRecord>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
            && self.engagements.is_empty()
            && self.next_engagement_id.is_none()
            && self.events.is_empty()
    }

    /// Reject amounts a backend could not store exactly.
    pub fn check_amounts(&self) -> StorageResult<()> {
        let agent_amounts = self.agents.iter().flat_map(|a| {
            [
                ("rate_per_day", a.rate_per_day),
                ("total_earnings", a.total_earnings),
            ]
        });
        let engagement_amounts = self.engagements.iter().flat_map(|e| {
            [
                ("payment", e.payment),
                ("duration_days", e.duration_days),
            ]
        });
        match agent_amounts
            .chain(engagement_amounts)
            .find(|(_, value)| *value > MAX_BALANCE)
        {
            Some((field, value)) => Err(StorageError::OutOfRange { field, value }),
            None => Ok(()),
        }
    }

    /// Reject events that do not continue the log at `log_len`.
    pub fn check_sequence(&self, log_len: u64) -> StorageResult<()> {
        for (expected, record) in (log_len..).zip(&self.events) {
            if record.seq != expected {
                return Err(StorageError::SequenceConflict {
                    expected,
                    found: record.seq,
                });
            }
        }
        Ok(())
    }
}

/// Durable ledger state.
///
/// Guarantees:
/// - `commit` is all-or-nothing: either every write in the batch is visible
///   afterwards or none is.
/// - Events are append-only and ordered by a gap-free `seq`.
/// - `load` after a restart returns exactly what was last committed.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the registry, engagement table and counter.
    async fn load(&self) -> StorageResult<LedgerSnapshot>;

    /// Apply a batch atomically.
    async fn commit(&self, batch: LedgerBatch) -> StorageResult<()>;

    /// Events with `seq >= from_seq`, ordered by seq.
    async fn events(&self, from_seq: u64) -> StorageResult<Vec<EventRecord>>;
}
