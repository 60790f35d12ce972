//! Shared fixtures for ledger integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use escrow_core::{AccountId, Balance, EscrowLedger, LedgerConfig, MemoryTokenLedger};
use escrow_state::fakes::MemoryLedgerStore;
use escrow_state::LedgerStore;

pub type MemoryLedger = EscrowLedger<MemoryTokenLedger, MemoryLedgerStore>;

pub const ADMIN: AccountId = addr(1);
pub const CUSTODY: AccountId = addr(2);
pub const TOKEN: AccountId = addr(3);
pub const AGENT_X: AccountId = addr(10);
pub const AGENT_Y: AccountId = addr(11);
pub const CLIENT: AccountId = addr(100);
pub const CLIENT_B: AccountId = addr(101);
pub const STRANGER: AccountId = addr(200);

/// Identity with `n` in its last byte.
pub const fn addr(n: u8) -> AccountId {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    AccountId::from_bytes(bytes)
}

pub fn config() -> LedgerConfig {
    LedgerConfig::new(ADMIN, CUSTODY)
}

pub struct Harness {
    pub ledger: Arc<MemoryLedger>,
    pub token: Arc<MemoryTokenLedger>,
    pub store: Arc<MemoryLedgerStore>,
}

impl Harness {
    pub async fn new() -> Self {
        let token = Arc::new(MemoryTokenLedger::new(TOKEN));
        let store = Arc::new(MemoryLedgerStore::new());
        Self::open(token, store).await
    }

    /// Open a fresh ledger over existing collaborators, as after a restart.
    pub async fn open(token: Arc<MemoryTokenLedger>, store: Arc<MemoryLedgerStore>) -> Self {
        let ledger = EscrowLedger::open(token.clone(), store.clone(), config())
            .await
            .unwrap();
        Self {
            ledger: Arc::new(ledger),
            token,
            store,
        }
    }

    pub async fn reopen(&self) -> Self {
        Self::open(self.token.clone(), self.store.clone()).await
    }

    /// Mint `amount` to `who` and approve custody to pull `approved` of it.
    pub fn fund(&self, who: AccountId, amount: Balance, approved: Balance) {
        self.token.mint(&who, amount).unwrap();
        self.token.approve(&who, &CUSTODY, approved).unwrap();
    }

    pub async fn register(&self, agent: AccountId, rate: Balance) {
        self.ledger
            .register_agent(ADMIN, agent, "research", rate)
            .await
            .unwrap();
    }

    pub async fn balance(&self, who: AccountId) -> Balance {
        use escrow_core::ValueTransfer;
        self.token.balance_of(&who).await.unwrap()
    }

    pub async fn stored_event_kinds(&self) -> Vec<&'static str> {
        self.store
            .events(0)
            .await
            .unwrap()
            .iter()
            .map(|r| r.event.kind())
            .collect()
    }
}
