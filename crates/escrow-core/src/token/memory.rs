//! In-process token ledger.
//!
//! `MemoryTokenLedger` backs tests and the local CLI sandbox. It can be
//! told to reject the next transfer and can run a [`TransferHook`] inside
//! every transfer, which is how reentrant callbacks are simulated.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use escrow_state::{AccountId, Balance};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    TransferError, TransferHook, TransferKind, TransferNotice, TransferResult, ValueTransfer,
};

/// Serializable balances and allowances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBook {
    /// Address the token reports for itself
    pub address: AccountId,
    pub balances: BTreeMap<AccountId, Balance>,
    /// owner -> spender -> approved amount
    pub allowances: BTreeMap<AccountId, BTreeMap<AccountId, Balance>>,
    pub total_supply: Balance,
}

impl TokenBook {
    pub fn new(address: AccountId) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    pub fn balance(&self, owner: &AccountId) -> Balance {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Balance {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Read a book written by [`TokenBook::save_json`].
    pub fn load_json(path: impl AsRef<Path>) -> TransferResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| TransferError::Backend(format!("read {}: {e}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TransferError::Backend(format!("parse {}: {e}", path.display())))
    }

    /// Write the book as pretty JSON, replacing any existing file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> TransferResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| TransferError::Backend(e.to_string()))?;
        // write-then-rename so a crash never leaves a truncated book
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| TransferError::Backend(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| TransferError::Backend(format!("rename {}: {e}", path.display())))
    }

    fn debit(&mut self, owner: &AccountId, amount: Balance) -> TransferResult<()> {
        let available = self.balance(owner);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                owner: *owner,
                available,
                required: amount,
            });
        }
        self.balances.insert(*owner, available - amount);
        Ok(())
    }

    fn credit(&mut self, owner: &AccountId, amount: Balance) -> TransferResult<()> {
        let current = self.balance(owner);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected(format!("balance overflow for {owner}")))?;
        self.balances.insert(*owner, updated);
        Ok(())
    }

    /// Debit then credit, restoring the debit if the credit fails.
    fn move_value(&mut self, from: &AccountId, to: &AccountId, amount: Balance) -> TransferResult<()> {
        self.debit(from, amount)?;
        if let Err(e) = self.credit(to, amount) {
            let restored = self.balance(from) + amount;
            self.balances.insert(*from, restored);
            return Err(e);
        }
        Ok(())
    }
}

/// In-memory [`ValueTransfer`] implementation.
#[derive(Default)]
pub struct MemoryTokenLedger {
    book: Mutex<TokenBook>,
    fail_next: Mutex<Option<String>>,
    hook: RwLock<Option<Arc<dyn TransferHook>>>,
}

impl std::fmt::Debug for MemoryTokenLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTokenLedger")
            .field("book", &self.book)
            .finish_non_exhaustive()
    }
}

impl MemoryTokenLedger {
    pub fn new(address: AccountId) -> Self {
        Self::from_book(TokenBook::new(address))
    }

    pub fn from_book(book: TokenBook) -> Self {
        Self {
            book: Mutex::new(book),
            ..Self::default()
        }
    }

    /// Copy of the current balances and allowances.
    pub fn book(&self) -> TransferResult<TokenBook> {
        Ok(self.lock()?.clone())
    }

    /// Create `amount` new units in `to`'s balance.
    pub fn mint(&self, to: &AccountId, amount: Balance) -> TransferResult<()> {
        let mut book = self.lock()?;
        let supply = book
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("total supply overflow".to_string()))?;
        book.credit(to, amount)?;
        book.total_supply = supply;
        Ok(())
    }

    /// Set the amount `spender` may move out of `owner`'s balance.
    pub fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Balance,
    ) -> TransferResult<()> {
        let mut book = self.lock()?;
        book.allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
        Ok(())
    }

    /// Reject the next `transfer` or `transfer_from` with `reason`.
    pub fn fail_next_transfer(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(reason.into());
        }
    }

    /// Run `hook` inside every subsequent transfer.
    pub fn set_hook(&self, hook: Arc<dyn TransferHook>) {
        if let Ok(mut slot) = self.hook.write() {
            *slot = Some(hook);
        }
    }

    pub fn clear_hook(&self) {
        if let Ok(mut slot) = self.hook.write() {
            *slot = None;
        }
    }

    fn lock(&self) -> TransferResult<MutexGuard<'_, TokenBook>> {
        self.book
            .lock()
            .map_err(|_| TransferError::Backend("token book lock poisoned".to_string()))
    }

    fn take_injected_failure(&self) -> TransferResult<()> {
        let injected = self
            .fail_next
            .lock()
            .map_err(|_| TransferError::Backend("failure slot lock poisoned".to_string()))?
            .take();
        match injected {
            Some(reason) => Err(TransferError::Rejected(reason)),
            None => Ok(()),
        }
    }

    fn current_hook(&self) -> Option<Arc<dyn TransferHook>> {
        self.hook.read().ok().and_then(|slot| slot.clone())
    }

    async fn notify(&self, notice: TransferNotice) {
        if let Some(hook) = self.current_hook() {
            hook.on_transfer(&notice).await;
        }
    }
}

#[async_trait]
impl ValueTransfer for MemoryTokenLedger {
    fn address(&self) -> AccountId {
        self.lock().map(|book| book.address).unwrap_or(AccountId::ZERO)
    }

    async fn balance_of(&self, owner: &AccountId) -> TransferResult<Balance> {
        Ok(self.lock()?.balance(owner))
    }

    async fn allowance(&self, owner: &AccountId, spender: &AccountId) -> TransferResult<Balance> {
        Ok(self.lock()?.allowance(owner, spender))
    }

    async fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Balance,
    ) -> TransferResult<()> {
        self.take_injected_failure()?;
        {
            let mut book = self.lock()?;
            let approved = book.allowance(from, spender);
            if approved < amount {
                return Err(TransferError::InsufficientAllowance {
                    owner: *from,
                    spender: *spender,
                    approved,
                    required: amount,
                });
            }
            book.move_value(from, to, amount)?;
            book.allowances
                .entry(*from)
                .or_default()
                .insert(*spender, approved - amount);
        }
        debug!(from = %from, to = %to, amount, "token pull");

        self.notify(TransferNotice {
            kind: TransferKind::Pull,
            from: *from,
            to: *to,
            amount,
        })
        .await;
        Ok(())
    }

    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Balance,
    ) -> TransferResult<()> {
        self.take_injected_failure()?;
        self.lock()?.move_value(from, to, amount)?;
        debug!(from = %from, to = %to, amount, "token push");

        self.notify(TransferNotice {
            kind: TransferKind::Push,
            from: *from,
            to: *to,
            amount,
        })
        .await;
        Ok(())
    }
}
