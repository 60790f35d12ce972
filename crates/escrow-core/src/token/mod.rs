//! Value-transfer capability.
//!
//! The ledger never holds balances itself. It pulls escrow into its custody
//! account and pushes settlements out through a token-style collaborator
//! implementing [`ValueTransfer`].

pub mod memory;

use async_trait::async_trait;
use escrow_state::{AccountId, Balance};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{MemoryTokenLedger, TokenBook};

/// Errors from the value-transfer collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient balance: {owner} holds {available}, needs {required}")]
    InsufficientBalance {
        owner: AccountId,
        available: Balance,
        required: Balance,
    },

    #[error("insufficient allowance: {owner} approved {approved} to {spender}, needs {required}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        approved: Balance,
        required: Balance,
    },

    #[error("transfer rejected: {0}")]
    Rejected(String),

    #[error("token backend error: {0}")]
    Backend(String),
}

pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Token-style ledger the escrow moves value through.
///
/// Guarantees expected of implementations:
/// - `transfer_from` and `transfer` are all-or-nothing; a failed call leaves
///   every balance and allowance unchanged.
/// - `transfer_from` consumes `amount` of the allowance `from` granted to
///   `spender`.
#[async_trait]
pub trait ValueTransfer: Send + Sync {
    /// Address of the token ledger itself. Zero means "not configured".
    fn address(&self) -> AccountId;

    async fn balance_of(&self, owner: &AccountId) -> TransferResult<Balance>;

    /// Amount `owner` has approved `spender` to move.
    async fn allowance(&self, owner: &AccountId, spender: &AccountId) -> TransferResult<Balance>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    async fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Balance,
    ) -> TransferResult<()>;

    /// Move `amount` out of `from`'s own balance.
    async fn transfer(&self, from: &AccountId, to: &AccountId, amount: Balance)
        -> TransferResult<()>;
}

/// Which direction a transfer moved value, from the token's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// `transfer_from`, allowance-backed
    Pull,
    /// `transfer`, owner-initiated
    Push,
}

/// A completed transfer, as reported to a [`TransferHook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferNotice {
    pub kind: TransferKind,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Balance,
}

/// Callback run by a token after it moves value and before the transfer
/// call returns, the way receiver hooks work on some token standards.
///
/// A hook runs while the ledger operation that caused the transfer still
/// holds the ledger's serialization lock. Mutating ledger calls made
/// directly from the hook fail with `ReentrantCall`. A mutating call moved
/// onto another task (`tokio::spawn`) does not carry the reentrancy marker
/// and waits for that lock, so a hook must never await such a task: the
/// outer operation cannot finish until the hook returns. Spawn it and let
/// it run after the outer call completes.
#[async_trait]
pub trait TransferHook: Send + Sync {
    async fn on_transfer(&self, notice: &TransferNotice);
}
