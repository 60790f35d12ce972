//! Engagement creation and settlement.
//!
//! The collaborator transfer is the point of no return for both
//! operations. Everything that can fail without moving value (checks,
//! id allocation, event sealing) happens first.

use chrono::{DateTime, Utc};
use escrow_state::{
    AccountId, AgentRecord, Balance, EngagementId, EngagementRecord, LedgerBatch, LedgerEvent,
    LedgerStore, MAX_BALANCE,
};
use tracing::instrument;

use super::{guard, EscrowLedger, LedgerState};
use crate::domain::{EngagementReceipt, LedgerError, Result, SettlementReceipt};
use crate::metrics::METRICS;
use crate::obs;
use crate::token::ValueTransfer;

/// Agent must be active and the duration non-zero; returns the payment,
/// which must not exceed `MAX_BALANCE`.
fn quote(state: &LedgerState, agent: &AccountId, duration_days: u64) -> Result<Balance> {
    let rate = match state.agent(agent) {
        Some(record) if record.is_active => record.rate_per_day,
        _ => return Err(LedgerError::AgentNotActive(*agent)),
    };
    if duration_days == 0 {
        return Err(LedgerError::ZeroDurationNotAllowed);
    }
    rate.checked_mul(duration_days)
        .filter(|payment| *payment <= MAX_BALANCE)
        .ok_or(LedgerError::PaymentOverflow {
            rate,
            days: duration_days,
        })
}

/// Returns the engagement and its agent's record if `caller` may settle it.
///
/// A completed engagement is reported as such before the active check, so
/// a repeat settlement reads `EngagementAlreadyCompleted`.
fn check_settlement<'a>(
    state: &'a LedgerState,
    admin: &AccountId,
    caller: &AccountId,
    id: EngagementId,
) -> Result<(&'a EngagementRecord, &'a AgentRecord)> {
    let engagement = state
        .engagement(id)
        .ok_or(LedgerError::EngagementNotActive(id))?;
    if engagement.is_completed {
        return Err(LedgerError::EngagementAlreadyCompleted(id));
    }
    if !engagement.is_active {
        return Err(LedgerError::EngagementNotActive(id));
    }
    if caller != &engagement.agent && caller != admin {
        return Err(LedgerError::NotAuthorized { caller: *caller });
    }
    let agent = state.agent(&engagement.agent).ok_or_else(|| {
        LedgerError::CorruptState(format!(
            "engagement {id} references unregistered agent {}",
            engagement.agent
        ))
    })?;
    Ok((engagement, agent))
}

fn creation_batch(
    state: &LedgerState,
    user: AccountId,
    agent: AccountId,
    duration_days: u64,
    payment: Balance,
    now: DateTime<Utc>,
) -> Result<(EngagementRecord, LedgerBatch)> {
    let engagement_id = state.next_engagement_id();
    let next = engagement_id
        .checked_add(1)
        .ok_or_else(|| LedgerError::CorruptState("engagement id space exhausted".to_string()))?;

    let record = EngagementRecord {
        engagement_id,
        user,
        agent,
        start_time: now,
        duration_days,
        payment,
        is_active: true,
        is_completed: false,
        completed_at: None,
    };
    let events = state.seal(
        vec![LedgerEvent::EngagementCreated {
            engagement_id,
            user,
            agent,
            payment,
        }],
        now,
    )?;
    let batch = LedgerBatch {
        engagements: vec![record.clone()],
        next_engagement_id: Some(next),
        events,
        ..LedgerBatch::default()
    };
    Ok((record, batch))
}

fn settlement_batch(
    state: &LedgerState,
    engagement: &EngagementRecord,
    agent: &AgentRecord,
    now: DateTime<Utc>,
) -> Result<(AgentRecord, LedgerBatch)> {
    let total_earnings = agent
        .total_earnings
        .checked_add(engagement.payment)
        .filter(|total| *total <= MAX_BALANCE)
        .ok_or(LedgerError::EarningsOverflow(agent.wallet_address))?;

    let settled = EngagementRecord {
        is_active: false,
        is_completed: true,
        completed_at: Some(now),
        ..engagement.clone()
    };
    let paid = AgentRecord {
        total_earnings,
        ..agent.clone()
    };
    let events = state.seal(
        vec![
            LedgerEvent::EngagementCompleted {
                engagement_id: engagement.engagement_id,
                payment: engagement.payment,
            },
            LedgerEvent::PaymentReleased {
                agent: agent.wallet_address,
                amount: engagement.payment,
            },
        ],
        now,
    )?;
    let batch = LedgerBatch {
        agents: vec![paid.clone()],
        engagements: vec![settled],
        events,
        ..LedgerBatch::default()
    };
    Ok((paid, batch))
}

impl<T, S> EscrowLedger<T, S>
where
    T: ValueTransfer,
    S: LedgerStore,
{
    /// Hire `agent` for `duration_days`, pulling `rate * days` from `caller`
    /// into custody.
    ///
    /// Refusals, in order: `CustodyCannotHire`, `AgentNotActive`,
    /// `ZeroDurationNotAllowed`, `PaymentOverflow`, `InsufficientUsdt`,
    /// `InsufficientAllowance`. A refused or failed call consumes no
    /// engagement id.
    #[instrument(skip(self), fields(caller = %caller, agent = %agent))]
    pub async fn create_engagement(
        &self,
        caller: AccountId,
        agent: AccountId,
        duration_days: u64,
    ) -> Result<EngagementReceipt> {
        guard::non_reentrant(async {
            let _serial = self.serial.lock().await;
            self.flush_pending().await?;

            let reject = |e: LedgerError| self.rejected("create_engagement", &caller, e);
            let custody = self.config.custody;
            if caller == custody {
                return Err(reject(LedgerError::CustodyCannotHire));
            }

            let payment = quote(&*self.state.read().await, &agent, duration_days).map_err(reject)?;

            let available = self.token.balance_of(&caller).await?;
            if available < payment {
                return Err(reject(LedgerError::InsufficientUsdt {
                    required: payment,
                    available,
                }));
            }
            let approved = self.token.allowance(&caller, &custody).await?;
            if approved < payment {
                return Err(reject(LedgerError::InsufficientAllowance {
                    required: payment,
                    approved,
                }));
            }

            let (record, batch) = creation_batch(
                &*self.state.read().await,
                caller,
                agent,
                duration_days,
                payment,
                Utc::now(),
            )?;

            self.token
                .transfer_from(&custody, &caller, &custody, payment)
                .await?;

            self.state.write().await.apply(&batch);
            self.persist_or_defer(batch).await;

            METRICS.record_engagement_created(payment);
            obs::emit_engagement_created(record.engagement_id, &caller, &agent, payment);
            Ok(EngagementReceipt {
                engagement_id: record.engagement_id,
                user: caller,
                agent,
                payment,
                start_time: record.start_time,
            })
        })
        .await
    }

    /// Settle engagement `id`, releasing its payment from custody to the
    /// agent. The agent or the admin may settle.
    ///
    /// The engagement reads as completed before the push starts, so
    /// anything observing the ledger during the push (a token callback
    /// included) sees it settled. If the push fails the change is undone.
    #[instrument(skip(self), fields(caller = %caller))]
    pub async fn complete_engagement(
        &self,
        caller: AccountId,
        id: EngagementId,
    ) -> Result<SettlementReceipt> {
        guard::non_reentrant(async {
            let _serial = self.serial.lock().await;
            self.flush_pending().await?;

            let (agent, payment, total_earnings, batch, checkpoint) = {
                let mut state = self.state.write().await;
                let (paid, payment, batch) = {
                    let (engagement, agent) =
                        check_settlement(&state, &self.config.admin, &caller, id)
                            .map_err(|e| self.rejected("complete_engagement", &caller, e))?;
                    let (paid, batch) = settlement_batch(&state, engagement, agent, Utc::now())?;
                    (paid, engagement.payment, batch)
                };

                let checkpoint = state.checkpoint(&batch);
                state.apply(&batch);
                (paid.wallet_address, payment, paid.total_earnings, batch, checkpoint)
            };

            if let Err(e) = self
                .token
                .transfer(&self.config.custody, &agent, payment)
                .await
            {
                self.state.write().await.restore(checkpoint);
                METRICS.inc_rolled_back();
                obs::emit_transfer_rolled_back(id, &e);
                return Err(e.into());
            }

            self.persist_or_defer(batch).await;

            METRICS.record_engagement_completed(payment);
            obs::emit_engagement_completed(id, payment);
            obs::emit_payment_released(&agent, payment);
            Ok(SettlementReceipt {
                engagement_id: id,
                agent,
                payment,
                total_earnings,
            })
        })
        .await
    }
}

