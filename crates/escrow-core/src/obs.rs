//! Structured observability hooks for ledger lifecycle events.
//!
//! One emitter per state change, mirroring the persisted event log, plus
//! warnings for refused operations, rolled-back transfers and deferred
//! commits. Events are emitted at `info!` (filter with `RUST_LOG`).

use escrow_state::{AccountId, Balance, EngagementId};
use tracing::{info, warn};

/// Emit event: ledger opened over a loaded snapshot.
pub fn emit_ledger_opened(admin: &AccountId, custody: &AccountId, agents: usize, engagements: usize) {
    info!(
        event = "ledger.opened",
        admin = %admin,
        custody = %custody,
        agents = agents,
        engagements = engagements,
    );
}

/// Emit event: agent added to the registry.
///
/// ```ignore
/// emit_agent_registered(&agent, "research", 100);
/// // logs: event=agent.registered agent=0x… agent_type=research rate_per_day=100
/// ```
pub fn emit_agent_registered(agent: &AccountId, agent_type: &str, rate_per_day: Balance) {
    info!(
        event = "agent.registered",
        agent = %agent,
        agent_type = %agent_type,
        rate_per_day = rate_per_day,
    );
}

pub fn emit_engagement_created(
    engagement_id: EngagementId,
    user: &AccountId,
    agent: &AccountId,
    payment: Balance,
) {
    info!(
        event = "engagement.created",
        engagement_id = engagement_id,
        user = %user,
        agent = %agent,
        payment = payment,
    );
}

pub fn emit_engagement_completed(engagement_id: EngagementId, payment: Balance) {
    info!(event = "engagement.completed", engagement_id = engagement_id, payment = payment);
}

pub fn emit_payment_released(agent: &AccountId, amount: Balance) {
    info!(event = "payment.released", agent = %agent, amount = amount);
}

/// Emit event: operation refused (warning level).
pub fn emit_operation_rejected(op: &str, caller: &AccountId, code: &str) {
    warn!(event = "operation.rejected", op = %op, caller = %caller, code = %code);
}

/// Emit event: settlement push failed and the in-memory state was restored.
pub fn emit_transfer_rolled_back(engagement_id: EngagementId, error: &dyn std::fmt::Display) {
    warn!(event = "transfer.rolled_back", engagement_id = engagement_id, error = %error);
}

/// Emit event: store commit failed after funds moved; batch queued for retry.
pub fn emit_commit_deferred(first_seq: Option<u64>, pending: usize, error: &dyn std::fmt::Display) {
    warn!(
        event = "commit.deferred",
        first_seq = ?first_seq,
        pending = pending,
        error = %error,
    );
}

/// Emit event: queued batches written to the store.
pub fn emit_pending_flushed(count: usize) {
    info!(event = "commit.flushed", count = count);
}
