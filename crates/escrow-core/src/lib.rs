//! Escrow Core Library
//!
//! An escrow-backed hiring ledger. An administrator registers agents with
//! a daily rate; clients hire an agent for a number of days by moving the
//! full fee into custody; the engagement is settled once, releasing the
//! fee to the agent.
//!
//! ## Layer 1 - Ledger Logic
//!
//! - `EscrowLedger`: registry, engagement creation and settlement behind
//!   one serialization boundary with reentrancy rejection
//! - `ValueTransfer`: the token-style collaborator funds move through
//! - `MemoryTokenLedger`: in-process token for tests and local sandboxes
//!
//! Persistence comes from `escrow-state` (`LedgerStore`).

pub mod domain;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod telemetry;
pub mod token;

pub use domain::{
    AgentDetails, EngagementReceipt, LedgerConfig, LedgerError, Result, SettlementReceipt,
};
pub use ledger::guard::in_ledger_call;
pub use ledger::{EscrowLedger, LedgerState};
pub use token::{
    MemoryTokenLedger, TokenBook, TransferError, TransferHook, TransferKind, TransferNotice,
    TransferResult, ValueTransfer,
};

pub use escrow_state::{
    AccountId, AgentRecord, Balance, EngagementId, EngagementRecord, EngagementStatus,
    EventDigest, EventRecord, LedgerEvent, LedgerStore,
};
