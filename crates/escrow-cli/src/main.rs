//! Agent Escrow - command-line front end for the escrow hiring ledger
//!
//! The `agent-escrow` command drives a local ledger sandbox: a persistent
//! ledger store plus an on-disk token book standing in for the token.
//!
//! ## Commands
//!
//! - `register`: Add an agent to the registry (admin only)
//! - `hire`: Open an engagement, moving the fee into custody
//! - `complete`: Settle an engagement, releasing the fee to the agent
//! - `agent`, `engagement`, `events`, `custody`, `verify`: Inspect state
//! - `mint`, `approve`, `balance`: Manage the local token book
//!
//! Every command prints one JSON document on stdout; logs go to stderr.

mod sandbox;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use escrow_core::metrics::METRICS;
use escrow_core::{AccountId, Balance, EngagementId, LedgerError, ValueTransfer};
use escrow_state::LedgerStore;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::Level;

use sandbox::{Sandbox, Settings};

#[derive(Parser)]
#[command(name = "agent-escrow")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Escrow-backed hiring ledger for agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the ledger store and token book
    #[arg(long, global = true, env = "ESCROW_DATA_DIR", default_value = ".agent-escrow")]
    data_dir: PathBuf,

    /// Administrator identity (registers agents, may settle)
    #[arg(long, global = true, env = "ESCROW_ADMIN")]
    admin: Option<AccountId>,

    /// Account escrowed funds are held in
    #[arg(long, global = true, env = "ESCROW_CUSTODY")]
    custody: Option<AccountId>,

    /// Token address, needed when the token book is first created
    #[arg(long, global = true, env = "ESCROW_TOKEN_ADDRESS")]
    token: Option<AccountId>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Commands {
    /// Register an agent with a daily rate
    Register {
        /// Calling identity (must be the admin)
        #[arg(long)]
        caller: AccountId,

        #[arg(long)]
        agent: AccountId,

        /// Free-form classification, e.g. "research"
        #[arg(long)]
        agent_type: String,

        /// Rate per day in the token's smallest unit
        #[arg(long)]
        rate: Balance,
    },

    /// Hire an agent for a number of days
    Hire {
        /// Hiring identity; pays the fee
        #[arg(long)]
        caller: AccountId,

        #[arg(long)]
        agent: AccountId,

        #[arg(long)]
        days: u64,
    },

    /// Settle an engagement and release its fee to the agent
    Complete {
        /// The engagement's agent or the admin
        #[arg(long)]
        caller: AccountId,

        #[arg(long)]
        engagement: EngagementId,
    },

    /// Show an agent's registry entry
    Agent { id: AccountId },

    /// Show an engagement
    Engagement { id: EngagementId },

    /// List persisted ledger events
    Events {
        /// First sequence number to include
        #[arg(long, default_value_t = 0)]
        from: u64,
    },

    /// Compare recorded escrow with the custody account's token balance
    Custody,

    /// Check the event hash chain and custody conservation
    Verify,

    /// Create tokens in the local token book
    Mint {
        #[arg(long)]
        to: AccountId,

        #[arg(long)]
        amount: Balance,
    },

    /// Let the custody account pull up to `amount` from `owner`
    Approve {
        #[arg(long)]
        owner: AccountId,

        #[arg(long)]
        amount: Balance,
    },

    /// Show a token balance
    Balance { id: AccountId },
}

impl Commands {
    /// Whether the token book may change.
    fn moves_tokens(&self) -> bool {
        matches!(
            self,
            Commands::Hire { .. }
                | Commands::Complete { .. }
                | Commands::Mint { .. }
                | Commands::Approve { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    escrow_core::telemetry::init_tracing(cli.json, level);

    let settings = Settings {
        data_dir: cli.data_dir,
        admin: cli.admin,
        custody: cli.custody,
        token: cli.token,
    };
    let sandbox = Sandbox::open(&settings).await?;

    let output = execute(&sandbox, &cli.command).await;
    if output.is_ok() && cli.command.moves_tokens() {
        sandbox.save_book()?;
    }
    METRICS.flush();

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

/// Surface the stable error name alongside the message.
fn ledger_err(e: LedgerError) -> anyhow::Error {
    anyhow!("{}: {e}", e.code())
}

fn to_value(value: impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

async fn execute<S: LedgerStore>(sandbox: &Sandbox<S>, command: &Commands) -> Result<Value> {
    let ledger = &sandbox.ledger;
    match command {
        Commands::Register {
            caller,
            agent,
            agent_type,
            rate,
        } => {
            let record = ledger
                .register_agent(*caller, *agent, agent_type.as_str(), *rate)
                .await
                .map_err(ledger_err)?;
            to_value(record)
        }
        Commands::Hire {
            caller,
            agent,
            days,
        } => {
            let receipt = ledger
                .create_engagement(*caller, *agent, *days)
                .await
                .map_err(ledger_err)?;
            to_value(receipt)
        }
        Commands::Complete { caller, engagement } => {
            let receipt = ledger
                .complete_engagement(*caller, *engagement)
                .await
                .map_err(ledger_err)?;
            to_value(receipt)
        }
        Commands::Agent { id } => {
            let details = ledger.get_agent_details(id).await;
            Ok(json!({ "agent": id, "details": details }))
        }
        Commands::Engagement { id } => match ledger.get_engagement(*id).await {
            Some(record) => {
                let mut value = to_value(&record)?;
                value["status"] = to_value(record.status())?;
                Ok(value)
            }
            None => Err(ledger_err(LedgerError::EngagementNotActive(*id))),
        },
        Commands::Events { from } => {
            let events = ledger.events(*from).await.map_err(ledger_err)?;
            to_value(events)
        }
        Commands::Custody => {
            let recorded = ledger.custody_balance().await;
            let held = sandbox.token.balance_of(&ledger.custody_account()).await?;
            Ok(json!({
                "custody": ledger.custody_account(),
                "recorded": recorded,
                "held": held,
                "balanced": recorded == held,
                "pending_batches": ledger.pending_batches().await,
            }))
        }
        Commands::Verify => {
            let (head, len) = ledger.verify_event_log().await.map_err(ledger_err)?;
            let custody = ledger.reconcile_custody().await.map_err(ledger_err)?;
            Ok(json!({
                "events": len,
                "head": head,
                "custody": custody,
                "ok": true,
            }))
        }
        Commands::Mint { to, amount } => {
            sandbox.token.mint(to, *amount)?;
            let balance = sandbox.token.balance_of(to).await?;
            Ok(json!({ "account": to, "balance": balance }))
        }
        Commands::Approve { owner, amount } => {
            let spender = ledger.custody_account();
            sandbox.token.approve(owner, &spender, *amount)?;
            Ok(json!({ "owner": owner, "spender": spender, "allowance": amount }))
        }
        Commands::Balance { id } => {
            let balance = sandbox.token.balance_of(id).await?;
            let allowance = sandbox
                .token
                .allowance(id, &ledger.custody_account())
                .await?;
            Ok(json!({ "account": id, "balance": balance, "custody_allowance": allowance }))
        }
    }
}
