//! Values returned by the ledger to its callers.

use chrono::{DateTime, Utc};
use escrow_state::{AccountId, AgentRecord, Balance, EngagementId};
use serde::{Deserialize, Serialize};

/// Fixed identities a ledger is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// The only identity allowed to register agents; may also settle
    pub admin: AccountId,
    /// Account the escrowed funds sit in between create and complete
    pub custody: AccountId,
}

impl LedgerConfig {
    pub fn new(admin: AccountId, custody: AccountId) -> Self {
        Self { admin, custody }
    }
}

/// Public view of a registry entry.
///
/// Unknown identities read back as the zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDetails {
    pub agent_type: String,
    pub rate_per_day: Balance,
    pub is_active: bool,
    pub total_earnings: Balance,
}

impl From<&AgentRecord> for AgentDetails {
    fn from(record: &AgentRecord) -> Self {
        Self {
            agent_type: record.agent_type.clone(),
            rate_per_day: record.rate_per_day,
            is_active: record.is_active,
            total_earnings: record.total_earnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementReceipt {
    pub engagement_id: EngagementId,
    pub user: AccountId,
    pub agent: AccountId,
    pub payment: Balance,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub engagement_id: EngagementId,
    pub agent: AccountId,
    pub payment: Balance,
    /// Agent's lifetime earnings after this settlement
    pub total_earnings: Balance,
}
