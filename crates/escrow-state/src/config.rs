//! Store connection settings.
//!
//! Supports local (in-memory or on-disk SurrealKV) and remote (WebSocket)
//! SurrealDB deployments.

use std::path::Path;

use crate::error::StateError;

/// Default namespace for ledger tables.
pub const DEFAULT_NAMESPACE: &str = "escrow";
/// Default database for ledger tables.
pub const DEFAULT_DATABASE: &str = "ledger";

/// Login for a remote SurrealDB instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

/// Configuration for a SurrealDB-backed ledger store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Engine URL (`mem://`, `surrealkv://path`, `wss://host`)
    pub endpoint: String,
    /// Namespace (default: "escrow")
    pub namespace: String,
    /// Database name (default: "ledger")
    pub database: String,
    /// Sign-in credentials, if the endpoint requires them
    pub credentials: Option<Credentials>,
}

impl StoreConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            credentials: None,
        }
    }

    /// Volatile store, gone when the process exits.
    pub fn in_memory() -> Self {
        Self::new("mem://")
    }

    /// Durable on-disk store rooted at `path`.
    pub fn local(path: impl AsRef<Path>) -> Self {
        Self::new(format!("surrealkv://{}", path.as_ref().display()))
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Sign in before selecting the namespace
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        is_root: bool,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
            is_root,
        });
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - ESCROW_DB_URL (required)
    /// - ESCROW_DB_NAMESPACE (optional, default: "escrow")
    /// - ESCROW_DB_DATABASE (optional, default: "ledger")
    /// - ESCROW_DB_USERNAME / ESCROW_DB_PASSWORD (optional, both or neither)
    /// - ESCROW_DB_ROOT (optional, default: "false") - set to "true" for root users
    pub fn from_env() -> Result<Self, StateError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StateError> {
        let endpoint = lookup("ESCROW_DB_URL")
            .ok_or_else(|| StateError::Config("ESCROW_DB_URL not set".to_string()))?;
        let mut config = Self::new(endpoint);

        if let Some(ns) = lookup("ESCROW_DB_NAMESPACE") {
            config = config.with_namespace(ns);
        }
        if let Some(db) = lookup("ESCROW_DB_DATABASE") {
            config = config.with_database(db);
        }

        match (lookup("ESCROW_DB_USERNAME"), lookup("ESCROW_DB_PASSWORD")) {
            (Some(username), Some(password)) => {
                let is_root = lookup("ESCROW_DB_ROOT")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                config = config.with_credentials(username, password, is_root);
            }
            (None, None) => {}
            _ => {
                return Err(StateError::Config(
                    "ESCROW_DB_USERNAME and ESCROW_DB_PASSWORD must be set together".to_string(),
                ))
            }
        }

        Ok(config)
    }
}
