//! SurrealDB-backed LedgerStore implementation
//!
//! Uses the `schema` row types for persistence, converting to/from
//! `storage_traits` types at the boundary. Each `commit` is a single
//! `BEGIN TRANSACTION … COMMIT TRANSACTION` query.

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::config::StoreConfig;
use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{AgentRow, EngagementRow, EventRow, MetaRow};
use crate::storage_traits::{
    EventRecord, LedgerBatch, LedgerSnapshot, LedgerStore, StorageResult,
};

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed implementation of [`LedgerStore`].
#[derive(Clone)]
pub struct SurrealLedgerStore {
    db: Surreal<Any>,
}

impl SurrealLedgerStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `escrow/ledger`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    /// Connect using the given settings and initialize the schema.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: &StoreConfig) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(config.endpoint.as_str())
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if let Some(creds) = &config.credentials {
            if creds.is_root {
                db.signin(Root {
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
            }
        }

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealLedgerStore connected");
        Ok(Self { db })
    }

    /// Connect using `ESCROW_DB_*` environment variables.
    pub async fn from_env() -> crate::Result<Self> {
        let config = StoreConfig::from_env()?;
        Self::connect(&config).await
    }

    // -- private helpers -----------------------------------------------------

    async fn event_count(&self) -> StorageResult<u64> {
        #[derive(Deserialize)]
        struct CountRow {
            n: u64,
        }

        let mut res = self
            .db
            .query("SELECT count() AS n FROM ledger_events GROUP ALL")
            .await
            .map_err(backend)?;
        let rows: Vec<CountRow> = res.take(0).map_err(backend)?;
        Ok(rows.first().map(|r| r.n).unwrap_or(0))
    }

    fn commit_query(batch: &LedgerBatch) -> String {
        let mut sql = String::from("BEGIN TRANSACTION;\n");
        if !batch.agents.is_empty() {
            sql.push_str(
                "FOR $a IN $agents { UPSERT type::thing('agents', $a.wallet_address) CONTENT $a; };\n",
            );
        }
        if !batch.engagements.is_empty() {
            sql.push_str(
                "FOR $e IN $engagements { UPSERT type::thing('engagements', $e.engagement_id) CONTENT $e; };\n",
            );
        }
        if batch.next_engagement_id.is_some() {
            sql.push_str("UPSERT ledger_meta:counter CONTENT { next_engagement_id: $next_id };\n");
        }
        if !batch.events.is_empty() {
            sql.push_str("FOR $ev IN $events { CREATE ledger_events CONTENT $ev; };\n");
        }
        sql.push_str("COMMIT TRANSACTION;");
        sql
    }
}

#[async_trait]
impl LedgerStore for SurrealLedgerStore {
    #[instrument(skip(self))]
    async fn load(&self) -> StorageResult<LedgerSnapshot> {
        let mut res = self
            .db
            .query("SELECT * FROM agents ORDER BY wallet_address ASC")
            .query("SELECT * FROM engagements ORDER BY engagement_id ASC")
            .query("SELECT * FROM ledger_meta:counter")
            .await
            .map_err(backend)?;

        let agents: Vec<AgentRow> = res.take(0).map_err(backend)?;
        let engagements: Vec<EngagementRow> = res.take(1).map_err(backend)?;
        let meta: Vec<MetaRow> = res.take(2).map_err(backend)?;

        let snapshot = LedgerSnapshot {
            agents: agents
                .into_iter()
                .map(AgentRow::into_record)
                .collect::<StorageResult<_>>()?,
            engagements: engagements
                .into_iter()
                .map(EngagementRow::into_record)
                .collect::<StorageResult<_>>()?,
            next_engagement_id: meta.first().map(|m| m.next_engagement_id).unwrap_or(0),
        };

        debug!(
            agents = snapshot.agents.len(),
            engagements = snapshot.engagements.len(),
            next_engagement_id = snapshot.next_engagement_id,
            "ledger snapshot loaded"
        );
        Ok(snapshot)
    }

    #[instrument(skip(self, batch), fields(events = batch.events.len()))]
    async fn commit(&self, batch: LedgerBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        batch.check_amounts()?;
        if !batch.events.is_empty() {
            batch.check_sequence(self.event_count().await?)?;
        }

        let agents: Vec<AgentRow> = batch.agents.iter().map(AgentRow::from).collect();
        let engagements: Vec<EngagementRow> =
            batch.engagements.iter().map(EngagementRow::from).collect();
        let events: Vec<EventRow> = batch
            .events
            .iter()
            .map(EventRow::from_record)
            .collect::<StorageResult<_>>()?;
        let next_id = batch.next_engagement_id.unwrap_or_default();

        self.db
            .query(Self::commit_query(&batch))
            .bind(("agents", agents))
            .bind(("engagements", engagements))
            .bind(("next_id", next_id))
            .bind(("events", events))
            .await
            .map_err(backend)?
            .check()
            .map_err(|e| StorageError::Backend(format!("commit rolled back: {e}")))?;

        debug!("ledger batch committed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn events(&self, from_seq: u64) -> StorageResult<Vec<EventRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM ledger_events WHERE seq >= $from ORDER BY seq ASC")
            .bind(("from", from_seq))
            .await
            .map_err(backend)?;

        let rows: Vec<EventRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(EventRow::into_record).collect()
    }
}
