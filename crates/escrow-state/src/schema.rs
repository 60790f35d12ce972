//! Schema definitions for the escrow ledger SurrealDB tables
//!
//! Tables:
//! - agents: Agent registry, one row per wallet address
//! - engagements: Engagement table, one row per engagement id
//! - ledger_meta: Singleton row holding the engagement id counter
//! - ledger_events: Append-only hash-chained event log
//!
//! Rows keep identities as hex strings and events as JSON text so they map
//! onto plain SurrealDB scalars; conversion to the `storage_traits` types
//! happens at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    AccountId, AgentRecord, EngagementRecord, EventDigest, EventRecord, LedgerEvent,
    StorageResult,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

fn parse_account(field: &str, value: &str) -> StorageResult<AccountId> {
    value
        .parse()
        .map_err(|_| StorageError::CorruptRecord(format!("{field} is not an account id: {value}")))
}

// ---------------------------------------------------------------------------
// agents
// ---------------------------------------------------------------------------

/// Agent registry row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Wallet address (hex), also the record key
    pub wallet_address: String,
    pub agent_type: String,
    pub rate_per_day: u64,
    pub is_active: bool,
    pub total_earnings: u64,
    #[serde(default, with = "surreal_datetime_opt")]
    pub registered_at: Option<DateTime<Utc>>,
}

impl From<&AgentRecord> for AgentRow {
    fn from(record: &AgentRecord) -> Self {
        AgentRow {
            id: None,
            wallet_address: record.wallet_address.to_string(),
            agent_type: record.agent_type.clone(),
            rate_per_day: record.rate_per_day,
            is_active: record.is_active,
            total_earnings: record.total_earnings,
            registered_at: record.registered_at,
        }
    }
}

impl AgentRow {
    pub fn into_record(self) -> StorageResult<AgentRecord> {
        Ok(AgentRecord {
            wallet_address: parse_account("wallet_address", &self.wallet_address)?,
            agent_type: self.agent_type,
            rate_per_day: self.rate_per_day,
            is_active: self.is_active,
            total_earnings: self.total_earnings,
            registered_at: self.registered_at,
        })
    }
}

// ---------------------------------------------------------------------------
// engagements
// ---------------------------------------------------------------------------

/// Engagement row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Sequential id, also the record key
    pub engagement_id: u64,
    pub user: String,
    pub agent: String,
    #[serde(with = "surreal_datetime")]
    pub start_time: DateTime<Utc>,
    pub duration_days: u64,
    pub payment: u64,
    pub is_active: bool,
    pub is_completed: bool,
    #[serde(default, with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&EngagementRecord> for EngagementRow {
    fn from(record: &EngagementRecord) -> Self {
        EngagementRow {
            id: None,
            engagement_id: record.engagement_id,
            user: record.user.to_string(),
            agent: record.agent.to_string(),
            start_time: record.start_time,
            duration_days: record.duration_days,
            payment: record.payment,
            is_active: record.is_active,
            is_completed: record.is_completed,
            completed_at: record.completed_at,
        }
    }
}

impl EngagementRow {
    pub fn into_record(self) -> StorageResult<EngagementRecord> {
        if self.is_active && self.is_completed {
            return Err(StorageError::CorruptRecord(format!(
                "engagement {} is both active and completed",
                self.engagement_id
            )));
        }
        Ok(EngagementRecord {
            engagement_id: self.engagement_id,
            user: parse_account("user", &self.user)?,
            agent: parse_account("agent", &self.agent)?,
            start_time: self.start_time,
            duration_days: self.duration_days,
            payment: self.payment,
            is_active: self.is_active,
            is_completed: self.is_completed,
            completed_at: self.completed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// ledger_meta
// ---------------------------------------------------------------------------

/// Singleton counter row (`ledger_meta:counter`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub next_engagement_id: u64,
}

// ---------------------------------------------------------------------------
// ledger_events
// ---------------------------------------------------------------------------

/// Event log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub seq: u64,
    /// Event kind, indexed for filtering
    pub kind: String,
    /// Event body as JSON text
    pub payload: String,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
    pub prev_digest: String,
    pub digest: String,
}

impl EventRow {
    pub fn from_record(record: &EventRecord) -> StorageResult<Self> {
        Ok(EventRow {
            id: None,
            seq: record.seq,
            kind: record.event.kind().to_string(),
            payload: serde_json::to_string(&record.event)?,
            recorded_at: record.recorded_at,
            prev_digest: record.prev_digest.as_str().to_string(),
            digest: record.digest.as_str().to_string(),
        })
    }

    pub fn into_record(self) -> StorageResult<EventRecord> {
        let event: LedgerEvent = serde_json::from_str(&self.payload)
            .map_err(|e| StorageError::CorruptRecord(format!("event {}: {e}", self.seq)))?;
        Ok(EventRecord {
            seq: self.seq,
            event,
            recorded_at: self.recorded_at,
            prev_digest: EventDigest::try_from(self.prev_digest)?,
            digest: EventDigest::try_from(self.digest)?,
        })
    }
}
