//! SurrealDB schema migrations and initialization
//!
//! Sets up the ledger tables with their indexes. Every definition uses
//! `IF NOT EXISTS`, so reopening a durable store re-runs this safely.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all ledger tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing escrow ledger schema");

    init_agents_table(db).await?;
    init_engagements_table(db).await?;
    init_meta_table(db).await?;
    init_events_table(db).await?;

    info!("Escrow ledger schema initialization complete");
    Ok(())
}

async fn run(db: &Surreal<Any>, table: &str, sql: &'static str) -> Result<()> {
    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(format!("{table}: {e}")))?
        .check()
        .map_err(|e| StateError::SchemaSetup(format!("{table}: {e}")))?;
    debug!(table, "table initialized");
    Ok(())
}

/// Initialize `agents` table
///
/// Schema:
/// ```text
/// TABLE agents {
///   wallet_address:  STRING (record key, unique)
///   agent_type:      STRING (indexed)
///   rate_per_day:    INT
///   is_active:       BOOL
///   total_earnings:  INT
///   registered_at:   DATETIME?
/// }
/// ```
///
/// Rows are never deleted; re-registration is rejected by the ledger.
async fn init_agents_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agents SCHEMALESS
            PERMISSIONS
                FOR select, create, update FULL,
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_agent_wallet ON TABLE agents COLUMNS wallet_address UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_type ON TABLE agents COLUMNS agent_type;
    "#;
    run(db, "agents", sql).await
}

/// Initialize `engagements` table
///
/// Schema:
/// ```text
/// TABLE engagements {
///   engagement_id:  INT (record key, unique)
///   user:           STRING (indexed)
///   agent:          STRING (indexed)
///   start_time:     DATETIME
///   duration_days:  INT
///   payment:        INT
///   is_active:      BOOL
///   is_completed:   BOOL
///   completed_at:   DATETIME?
/// }
/// ```
///
/// Transitions active -> completed exactly once (enforced by the ledger).
async fn init_engagements_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS engagements SCHEMALESS
            PERMISSIONS
                FOR select, create, update FULL,
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_engagement_id ON TABLE engagements COLUMNS engagement_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_engagement_user ON TABLE engagements COLUMNS user;
        DEFINE INDEX IF NOT EXISTS idx_engagement_agent ON TABLE engagements COLUMNS agent;
    "#;
    run(db, "engagements", sql).await
}

/// Initialize `ledger_meta` table (singleton `ledger_meta:counter`)
async fn init_meta_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS ledger_meta SCHEMALESS
            PERMISSIONS
                FOR select, create, update FULL,
                FOR delete NONE;
    "#;
    run(db, "ledger_meta", sql).await
}

/// Initialize `ledger_events` table
///
/// Schema:
/// ```text
/// TABLE ledger_events {
///   seq:          INT (unique, gap-free from 0)
///   kind:         STRING (indexed)
///   payload:      STRING (event JSON)
///   recorded_at:  DATETIME
///   prev_digest:  STRING
///   digest:       STRING
/// }
/// ```
///
/// The unique `seq` index makes a concurrent double-append fail the
/// enclosing transaction.
async fn init_events_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS ledger_events SCHEMALESS
            PERMISSIONS
                FOR select, create FULL,
                FOR update, delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_event_seq ON TABLE ledger_events COLUMNS seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_event_kind ON TABLE ledger_events COLUMNS kind;
    "#;
    run(db, "ledger_events", sql).await
}
