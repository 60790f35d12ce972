//! Domain models for the escrow ledger.
//!
//! - `LedgerError`: everything an operation can refuse or fail with
//! - `LedgerConfig`: admin and custody identities
//! - Receipts and read views handed back to callers

pub mod error;
pub mod receipts;

pub use error::{LedgerError, Result};
pub use receipts::{AgentDetails, EngagementReceipt, LedgerConfig, SettlementReceipt};
