//! Escrow-State: SurrealDB Backend for the Agent Escrow Ledger
//!
//! This crate provides the persistence layer for the escrow ledger. It owns
//! the record types for the agent registry, the engagement table and the
//! event log, and the `LedgerStore` abstraction that writes them atomically.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Durability across restarts and all-or-nothing batch writes.
//!
//! ## Key Components
//!
//! - `LedgerStore`: Atomic batch persistence trait
//! - `MemoryLedgerStore`: In-memory fake for tests
//! - `SurrealLedgerStore`: SurrealDB implementation (mem, SurrealKV, remote)
//! - `StoreConfig`: Connection settings, optionally from the environment

pub mod config;
mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_ledger;

pub use config::{Credentials, StoreConfig};
pub use error::{StateError, StorageError};
pub use schema::{AgentRow, EngagementRow, EventRow, MetaRow};
pub use storage_traits::{
    verify_chain, AccountId, AgentRecord, Balance, EngagementId, EngagementRecord,
    EngagementStatus, EventDigest, EventRecord, LedgerBatch, LedgerEvent, LedgerSnapshot,
    LedgerStore, StorageResult, MAX_BALANCE,
};
pub use surreal_ledger::SurrealLedgerStore;

/// Result type for escrow-state connection operations
pub type Result<T> = std::result::Result<T, StateError>;
