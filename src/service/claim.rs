//! Claim executor: vault withdrawal and reward record creation.
//!
//! The reward record is created only after the claim transaction is
//! confirmed. Any failure before that point leaves the store untouched,
//! so a claim is never booked twice.

use std::sync::Arc;

use chrono::Utc;

use crate::capability::ledger::ClaimAccounts;
use crate::capability::{Capabilities, LedgerGateway, PriceFeed, TransactionRequest, TxPolicy};
use crate::config::BurnerConfig;
use crate::domain::amount::lamports_to_usd;
use crate::domain::{Address, EventBus, NewReward, PipelineEvent, RewardRecord, SignerRef};
use crate::error::PipelineError;
use crate::persistence::Records;

/// Submits claims and books confirmed ones.
#[derive(Debug, Clone)]
pub struct ClaimExecutor {
    ledger: Arc<dyn LedgerGateway>,
    prices: PriceFeed,
    records: Records,
    events: EventBus,
    policy: TxPolicy,
    signer: SignerRef,
    program_id: Address,
    authority: Address,
    accounts: ClaimAccounts,
}

impl ClaimExecutor {
    /// Builds the executor and derives the claim accounts.
    #[must_use]
    pub fn new(
        config: &BurnerConfig,
        capabilities: &Capabilities,
        records: Records,
        events: EventBus,
    ) -> Self {
        let ledger = Arc::clone(&capabilities.ledger);
        let accounts =
            ClaimAccounts::derive(ledger.as_ref(), &config.reward_program_id, &config.authority);
        Self {
            ledger,
            prices: PriceFeed::new(Arc::clone(&capabilities.oracle), config.fallback_sol_usd),
            records,
            events,
            policy: TxPolicy::from_config(config),
            signer: config.signer.clone(),
            program_id: config.reward_program_id.clone(),
            authority: config.authority.clone(),
            accounts,
        }
    }

    /// Claims `available` lamports observed in the vault just before.
    ///
    /// The booked `reward_amount` is `available`, not a receipt delta.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NoRewardsAvailable`] when `available` is zero.
    /// - Submission or confirmation errors; no record exists in that case.
    /// - Store errors when booking a confirmed claim.
    pub async fn claim(&self, available: u64) -> Result<RewardRecord, PipelineError> {
        if available == 0 {
            return Err(PipelineError::NoRewardsAvailable);
        }

        let tx = TransactionRequest::ClaimRewards {
            program_id: self.program_id.clone(),
            authority: self.authority.clone(),
            vault: self.accounts.vault.clone(),
            event_authority: self.accounts.event_authority.clone(),
        };
        let tx_ref = self.policy.submit(self.ledger.as_ref(), &tx, &self.signer).await?;

        if let Err(e) = self
            .policy
            .await_confirmation(self.ledger.as_ref(), &tx_ref)
            .await
        {
            if matches!(e, PipelineError::ConfirmationTimeout { .. }) {
                tracing::warn!(
                    %tx_ref,
                    lamports = available,
                    "claim unconfirmed; no record written, funds surface in the reserve drift check"
                );
            }
            return Err(e);
        }

        let valuation = self.prices.sol_usd().await;
        let reward = NewReward::claimed(
            available,
            lamports_to_usd(available, valuation.rate()),
            valuation.is_degraded(),
            tx_ref.clone(),
        );
        let record = self.records.create_reward(&reward).await.map_err(|e| {
            tracing::error!(%tx_ref, lamports = available, error = %e, "claim confirmed but not recorded");
            PipelineError::from(e)
        })?;

        self.events.publish(PipelineEvent::RewardClaimed {
            reward_id: record.id,
            lamports: available.to_string(),
            tx_ref: tx_ref.to_string(),
            price_degraded: record.price_degraded,
            timestamp: Utc::now(),
        });
        tracing::info!(
            reward_id = %record.id,
            %tx_ref,
            lamports = available,
            usd = record.reward_amount_usd,
            price_degraded = record.price_degraded,
            "rewards claimed"
        );
        Ok(record)
    }
}
