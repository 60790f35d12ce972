//! Local ledger sandbox: a persistent store plus a token book on disk.
//!
//! Layout under the data directory:
//! - `db/`: SurrealKV ledger store (unless `ESCROW_DB_URL` points elsewhere)
//! - `token-book.json`: balances and allowances of the local token

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use escrow_core::{AccountId, EscrowLedger, LedgerConfig, MemoryTokenLedger, TokenBook};
use escrow_state::{LedgerStore, StoreConfig, SurrealLedgerStore};
use tracing::debug;

pub const TOKEN_BOOK_FILE: &str = "token-book.json";

/// Identities and paths resolved from flags and environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub admin: Option<AccountId>,
    pub custody: Option<AccountId>,
    pub token: Option<AccountId>,
}

impl Settings {
    pub fn book_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_BOOK_FILE)
    }

    fn ledger_config(&self) -> Result<LedgerConfig> {
        let admin = self
            .admin
            .context("admin identity not set (use --admin or ESCROW_ADMIN)")?;
        let custody = self
            .custody
            .context("custody account not set (use --custody or ESCROW_CUSTODY)")?;
        Ok(LedgerConfig::new(admin, custody))
    }

    /// Existing book, or a new empty one for `--token`.
    fn load_book(&self) -> Result<TokenBook> {
        let path = self.book_path();
        if path.exists() {
            let book = TokenBook::load_json(&path)
                .with_context(|| format!("Failed to read token book {}", path.display()))?;
            if let Some(token) = self.token {
                if token != book.address {
                    bail!(
                        "token address {token} does not match the book at {} ({})",
                        path.display(),
                        book.address
                    );
                }
            }
            return Ok(book);
        }
        let address = self
            .token
            .context("no token book yet; pass --token or ESCROW_TOKEN_ADDRESS to create one")?;
        Ok(TokenBook::new(address))
    }
}

pub struct Sandbox<S> {
    pub ledger: EscrowLedger<MemoryTokenLedger, S>,
    pub token: Arc<MemoryTokenLedger>,
    book_path: PathBuf,
}

impl Sandbox<SurrealLedgerStore> {
    /// Open the sandbox under `settings.data_dir`, creating it if needed.
    pub async fn open(settings: &Settings) -> Result<Self> {
        std::fs::create_dir_all(&settings.data_dir).with_context(|| {
            format!("Failed to create data dir {}", settings.data_dir.display())
        })?;

        let store_config = if std::env::var_os("ESCROW_DB_URL").is_some() {
            StoreConfig::from_env().context("Invalid ESCROW_DB_* settings")?
        } else {
            StoreConfig::local(settings.data_dir.join("db"))
        };
        debug!(endpoint = %store_config.endpoint, "opening ledger store");
        let store = SurrealLedgerStore::connect(&store_config)
            .await
            .context("Failed to connect to ledger store")?;

        Self::with_store(settings, store).await
    }
}

impl<S: LedgerStore> Sandbox<S> {
    pub async fn with_store(settings: &Settings, store: S) -> Result<Self> {
        let config = settings.ledger_config()?;
        let token = Arc::new(MemoryTokenLedger::from_book(settings.load_book()?));
        let ledger = EscrowLedger::open(token.clone(), Arc::new(store), config)
            .await
            .map_err(|e| anyhow::anyhow!("{}: {e}", e.code()))
            .context("Failed to open ledger")?;

        Ok(Self {
            ledger,
            token,
            book_path: settings.book_path(),
        })
    }

    /// Persist the token book after balances changed.
    pub fn save_book(&self) -> Result<()> {
        save_book(&self.token, &self.book_path)
    }
}

fn save_book(token: &MemoryTokenLedger, path: &Path) -> Result<()> {
    token
        .book()
        .and_then(|book| book.save_json(path))
        .with_context(|| format!("Failed to write token book {}", path.display()))
}
