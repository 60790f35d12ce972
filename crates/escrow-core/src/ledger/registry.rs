//! Agent registry operations.

use chrono::Utc;
use escrow_state::{
    AccountId, AgentRecord, Balance, LedgerBatch, LedgerEvent, LedgerStore, MAX_BALANCE,
};
use tracing::instrument;

use super::{guard, EscrowLedger, LedgerState};
use crate::domain::{AgentDetails, LedgerConfig, LedgerError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::token::ValueTransfer;

/// Checks, in order: admin caller, rate within `1..=MAX_BALANCE`, identity
/// neither zero nor the custody account, first registration for the
/// identity.
fn check_registration(
    state: &LedgerState,
    config: &LedgerConfig,
    caller: &AccountId,
    identity: &AccountId,
    rate_per_day: Balance,
) -> Result<()> {
    if caller != &config.admin {
        return Err(LedgerError::NotAuthorized { caller: *caller });
    }
    if rate_per_day == 0 {
        return Err(LedgerError::ZeroRateNotAllowed);
    }
    if rate_per_day > MAX_BALANCE {
        return Err(LedgerError::RateTooHigh(rate_per_day));
    }
    // payouts to custody would never leave it
    if identity.is_zero() || identity == &config.custody {
        return Err(LedgerError::InvalidAgentAddress);
    }
    if state.agent(identity).is_some_and(AgentRecord::exists) {
        return Err(LedgerError::AgentAlreadyExists(*identity));
    }
    Ok(())
}

impl<T, S> EscrowLedger<T, S>
where
    T: ValueTransfer,
    S: LedgerStore,
{
    /// Add `identity` to the registry. Only the admin may call this, and an
    /// identity can be registered once, ever.
    ///
    /// No value moves, so the store commit comes first: if it fails the
    /// registry is unchanged.
    #[instrument(skip(self, agent_type), fields(caller = %caller, identity = %identity))]
    pub async fn register_agent(
        &self,
        caller: AccountId,
        identity: AccountId,
        agent_type: impl Into<String>,
        rate_per_day: Balance,
    ) -> Result<AgentRecord> {
        let agent_type = agent_type.into();
        guard::non_reentrant(async {
            let _serial = self.serial.lock().await;
            self.flush_pending().await?;

            let (record, batch) = {
                let state = self.state.read().await;
                check_registration(&state, &self.config, &caller, &identity, rate_per_day)
                    .map_err(|e| self.rejected("register_agent", &caller, e))?;

                let now = Utc::now();
                let record = AgentRecord {
                    wallet_address: identity,
                    agent_type: agent_type.clone(),
                    rate_per_day,
                    is_active: true,
                    total_earnings: 0,
                    registered_at: Some(now),
                };
                let events = state.seal(
                    vec![LedgerEvent::AgentRegistered {
                        agent: identity,
                        agent_type: agent_type.clone(),
                        rate_per_day,
                    }],
                    now,
                )?;
                let batch = LedgerBatch {
                    agents: vec![record.clone()],
                    events,
                    ..LedgerBatch::default()
                };
                (record, batch)
            };

            self.store.commit(batch.clone()).await?;
            self.state.write().await.apply(&batch);

            METRICS.inc_agents_registered();
            obs::emit_agent_registered(&identity, &agent_type, rate_per_day);
            Ok(record)
        })
        .await
    }

    /// Type, rate, active flag and earnings for `identity`.
    ///
    /// Unknown identities yield the zero value (`is_active == false`).
    pub async fn get_agent_details(&self, identity: &AccountId) -> AgentDetails {
        self.state
            .read()
            .await
            .agent(identity)
            .map(AgentDetails::from)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> AccountId {
        AccountId::from_low_u64(n)
    }

    fn config() -> LedgerConfig {
        LedgerConfig::new(id(1), id(2))
    }

    #[test]
    fn checks_run_in_order() {
        let state = LedgerState::default();
        let config = config();
        let admin = config.admin;

        // stranger with a zero rate: authorization is reported first
        let err = check_registration(&state, &config, &id(7), &id(3), 0).unwrap_err();
        assert_eq!(err.code(), "NotAuthorized");

        // admin with zero rate and zero identity: rate is reported first
        let err = check_registration(&state, &config, &admin, &AccountId::ZERO, 0).unwrap_err();
        assert_eq!(err, LedgerError::ZeroRateNotAllowed);

        let err = check_registration(&state, &config, &admin, &AccountId::ZERO, 5).unwrap_err();
        assert_eq!(err, LedgerError::InvalidAgentAddress);

        assert!(check_registration(&state, &config, &admin, &id(3), 5).is_ok());
    }

    #[test]
    fn rate_is_bounded_by_storable_amount() {
        let state = LedgerState::default();
        let config = config();

        let err = check_registration(&state, &config, &config.admin, &id(3), MAX_BALANCE + 1)
            .unwrap_err();
        assert_eq!(err, LedgerError::RateTooHigh(MAX_BALANCE + 1));
        assert!(check_registration(&state, &config, &config.admin, &id(3), MAX_BALANCE).is_ok());
    }

    #[test]
    fn custody_account_cannot_be_an_agent() {
        let state = LedgerState::default();
        let config = config();

        let err = check_registration(&state, &config, &config.admin, &config.custody, 5)
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidAgentAddress);
    }

    #[test]
    fn existing_wallet_blocks_registration() {
        let mut state = LedgerState::default();
        state.apply(&LedgerBatch {
            agents: vec![AgentRecord {
                wallet_address: id(3),
                agent_type: "ops".to_string(),
                rate_per_day: 10,
                is_active: true,
                total_earnings: 0,
                registered_at: None,
            }],
            ..LedgerBatch::default()
        });

        let err = check_registration(&state, &config(), &id(1), &id(3), 999).unwrap_err();
        assert_eq!(err, LedgerError::AgentAlreadyExists(id(3)));
    }
}
