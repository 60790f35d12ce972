//! Domain-level error taxonomy for the escrow ledger.

use escrow_state::{AccountId, Balance, EngagementId, StorageError};

use crate::token::TransferError;

/// Escrow ledger errors.
///
/// Every precondition failure is raised before any state or balance moves.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("agent already registered: {0}")]
    AgentAlreadyExists(AccountId),

    #[error("agent not active: {0}")]
    AgentNotActive(AccountId),

    #[error("rate per day must be greater than zero")]
    ZeroRateNotAllowed,

    #[error("rate per day {0} exceeds the largest storable amount")]
    RateTooHigh(Balance),

    #[error("invalid agent address: the zero account and the custody account cannot be registered")]
    InvalidAgentAddress,

    #[error("duration must be at least one day")]
    ZeroDurationNotAllowed,

    #[error("payment overflows: rate {rate} x {days} days")]
    PaymentOverflow { rate: Balance, days: u64 },

    #[error("insufficient USDT: required {required}, available {available}")]
    InsufficientUsdt {
        required: Balance,
        available: Balance,
    },

    #[error("insufficient allowance: required {required}, approved {approved}")]
    InsufficientAllowance {
        required: Balance,
        approved: Balance,
    },

    #[error("engagement not active: {0}")]
    EngagementNotActive(EngagementId),

    #[error("engagement already completed: {0}")]
    EngagementAlreadyCompleted(EngagementId),

    #[error("caller not authorized: {caller}")]
    NotAuthorized { caller: AccountId },

    #[error("the custody account cannot hire agents")]
    CustodyCannotHire,

    #[error("total earnings overflow for agent {0}")]
    EarningsOverflow(AccountId),

    #[error("invalid USDT address: token reports the zero address")]
    InvalidUsdtAddress,

    #[error("invalid admin: the zero account cannot administer the ledger")]
    InvalidAdmin,

    #[error("invalid custody account: escrow cannot be held by the zero account")]
    InvalidCustodyAccount,

    #[error("reentrant call rejected: a ledger operation is already running on this task")]
    ReentrantCall,

    #[error("custody mismatch: ledger records {recorded}, token holds {held}")]
    CustodyMismatch { recorded: Balance, held: Balance },

    #[error("corrupt ledger state: {0}")]
    CorruptState(String),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Stable error name, as surfaced to callers and the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AgentAlreadyExists(_) => "AgentAlreadyExists",
            LedgerError::AgentNotActive(_) => "AgentNotActive",
            LedgerError::ZeroRateNotAllowed => "ZeroRateNotAllowed",
            LedgerError::RateTooHigh(_) => "RateTooHigh",
            LedgerError::InvalidAgentAddress => "InvalidAgentAddress",
            LedgerError::ZeroDurationNotAllowed => "ZeroDurationNotAllowed",
            LedgerError::PaymentOverflow { .. } => "PaymentOverflow",
            LedgerError::InsufficientUsdt { .. } => "InsufficientUSDT",
            LedgerError::InsufficientAllowance { .. } => "InsufficientAllowance",
            LedgerError::EngagementNotActive(_) => "EngagementNotActive",
            LedgerError::EngagementAlreadyCompleted(_) => "EngagementAlreadyCompleted",
            LedgerError::NotAuthorized { .. } => "NotAuthorized",
            LedgerError::CustodyCannotHire => "CustodyCannotHire",
            LedgerError::EarningsOverflow(_) => "EarningsOverflow",
            LedgerError::InvalidUsdtAddress => "InvalidUSDTAddress",
            LedgerError::InvalidAdmin => "InvalidAdmin",
            LedgerError::InvalidCustodyAccount => "InvalidCustodyAccount",
            LedgerError::ReentrantCall => "ReentrantCall",
            LedgerError::CustodyMismatch { .. } => "CustodyMismatch",
            LedgerError::CorruptState(_) => "CorruptState",
            LedgerError::Transfer(_) => "TransferFailed",
            LedgerError::Storage(_) => "StorageFailed",
        }
    }

    /// True when the caller's request was refused before anything moved.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            LedgerError::Transfer(_)
                | LedgerError::Storage(_)
                | LedgerError::CorruptState(_)
                | LedgerError::CustodyMismatch { .. }
        )
    }
}

/// Result type for escrow ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
