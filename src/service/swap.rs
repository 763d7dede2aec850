//! Swap executor: converts claimed lamports into the target token.
//!
//! The bought amount is taken from the accepted quote, not from balance
//! deltas, since other activity on the authority wallet makes deltas
//! unattributable. The burn step caps its amount at the held balance,
//! which absorbs a fill below the quote.

use std::sync::Arc;

use chrono::Utc;

use crate::capability::{
    Capabilities, LedgerGateway, Quote, SwapService, TransactionRequest, TxPolicy,
};
use crate::config::BurnerConfig;
use crate::domain::amount::apply_bps;
use crate::domain::{
    Address, EventBus, PipelineEvent, RecordId, RewardRecord, RewardTransition, SignerRef, TxRef,
};
use crate::error::PipelineError;
use crate::persistence::Records;

/// Routes a share of claimed lamports through the swap aggregator.
#[derive(Debug, Clone)]
pub struct SwapExecutor {
    ledger: Arc<dyn LedgerGateway>,
    swap: Arc<dyn SwapService>,
    records: Records,
    events: EventBus,
    policy: TxPolicy,
    signer: SignerRef,
    authority: Address,
    input_mint: Address,
    output_mint: Address,
    swap_fraction_bps: u16,
    max_slippage_bps: u16,
}

/// Split of a claimed amount between swap input and fee reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSplit {
    /// Lamports routed into the swap.
    pub used: u64,
    /// Lamports kept for transaction fees.
    pub reserved: u64,
}

impl SwapSplit {
    /// Routes `fraction_bps` of `sol_amount` to the swap.
    #[must_use]
    pub fn of(sol_amount: u64, fraction_bps: u16) -> Self {
        let used = apply_bps(sol_amount, fraction_bps);
        Self {
            used,
            reserved: sol_amount - used,
        }
    }
}

impl SwapExecutor {
    /// Builds the executor from configuration and capability bindings.
    #[must_use]
    pub fn new(
        config: &BurnerConfig,
        capabilities: &Capabilities,
        records: Records,
        events: EventBus,
    ) -> Self {
        Self {
            ledger: Arc::clone(&capabilities.ledger),
            swap: Arc::clone(&capabilities.swap),
            records,
            events,
            policy: TxPolicy::from_config(config),
            signer: config.signer.clone(),
            authority: config.authority.clone(),
            input_mint: config.native_mint.clone(),
            output_mint: config.target_mint.clone(),
            swap_fraction_bps: config.swap_fraction_bps,
            max_slippage_bps: config.max_slippage_bps,
        }
    }

    /// Swaps the configured share of `sol_amount` for reward `reward_id`.
    ///
    /// On success the record is `bought`. On failure it is marked
    /// `failed` with the error message and the error is returned, except
    /// for a confirmation timeout or a record write after confirmation:
    /// those leave the record `claimed` with its pending swap reference
    /// for the reconciler.
    ///
    /// # Errors
    ///
    /// Returns the step's error after the record has been updated.
    pub async fn swap(&self, reward_id: RecordId, sol_amount: u64) -> Result<RewardRecord, PipelineError> {
        let split = SwapSplit::of(sol_amount, self.swap_fraction_bps);

        let (tx_ref, quote) = match self.submit(reward_id, split).await {
            Ok(submitted) => submitted,
            Err(e) => return Err(self.fail(reward_id, e).await),
        };

        if let Err(e) = self
            .policy
            .await_confirmation(self.ledger.as_ref(), &tx_ref)
            .await
        {
            if matches!(e, PipelineError::ConfirmationTimeout { .. }) {
                tracing::warn!(%reward_id, %tx_ref, "swap unconfirmed; left for reconciliation");
                return Err(e);
            }
            return Err(self.fail(reward_id, e).await);
        }

        self.record_bought(reward_id, &tx_ref, quote.expected_out, split)
            .await
    }

    async fn submit(
        &self,
        reward_id: RecordId,
        split: SwapSplit,
    ) -> Result<(TxRef, Quote), PipelineError> {
        if split.used == 0 {
            return Err(PipelineError::SwapService(
                "nothing to swap after fee reserve".to_string(),
            ));
        }

        let swap = self.swap.as_ref();
        let input = &self.input_mint;
        let output = &self.output_mint;
        let slippage = self.max_slippage_bps;
        let amount = split.used;
        let quote = self
            .policy
            .retry
            .run("quote", move || async move {
                let quote = swap.quote(input, output, amount, slippage).await?;
                quote.validate(amount)?;
                Ok(quote)
            })
            .await?;

        let signer = &self.authority;
        let quoted = &quote;
        let unsigned = self
            .policy
            .retry
            .run("build_swap", move || swap.build_swap_transaction(quoted, signer))
            .await?;

        let tx = TransactionRequest::Swap {
            transaction: unsigned,
        };
        self.records
            .transition_reward(reward_id, RewardTransition::BuyIntent)
            .await?;
        let tx_ref = self.policy.submit(self.ledger.as_ref(), &tx, &self.signer).await?;

        self.records
            .transition_reward(
                reward_id,
                RewardTransition::BuySubmitted {
                    tx_ref: tx_ref.clone(),
                    expected_tokens: quote.expected_out,
                    sol_used: split.used,
                    sol_reserved: split.reserved,
                },
            )
            .await?;
        tracing::info!(
            %reward_id,
            %tx_ref,
            sol_used = split.used,
            expected_out = quote.expected_out,
            min_out = quote.min_out,
            "swap submitted"
        );
        Ok((tx_ref, quote))
    }

    /// Books a confirmed swap. Also used by the reconciler for swaps that
    /// confirmed after the run gave up waiting.
    ///
    /// # Errors
    ///
    /// Returns the store error; the record keeps its pending reference.
    pub async fn record_bought(
        &self,
        reward_id: RecordId,
        tx_ref: &TxRef,
        tokens_bought: u64,
        split: SwapSplit,
    ) -> Result<RewardRecord, PipelineError> {
        let record = self
            .records
            .transition_reward(
                reward_id,
                RewardTransition::Bought {
                    tx_ref: tx_ref.clone(),
                    tokens_bought,
                    sol_used: split.used,
                    sol_reserved: split.reserved,
                },
            )
            .await
            .map_err(|e| {
                tracing::error!(%reward_id, %tx_ref, error = %e, "swap confirmed but not recorded");
                PipelineError::from(e)
            })?;

        self.events.publish(PipelineEvent::TokensBought {
            reward_id,
            sol_used: split.used.to_string(),
            tokens: tokens_bought.to_string(),
            tx_ref: tx_ref.to_string(),
            timestamp: Utc::now(),
        });
        tracing::info!(%reward_id, %tx_ref, tokens_bought, sol_used = split.used, "tokens bought");
        Ok(record)
    }

    async fn fail(&self, reward_id: RecordId, error: PipelineError) -> PipelineError {
        super::mark_failed(&self.records, &self.events, reward_id, &error.to_string()).await;
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reserves_the_remainder() {
        let split = SwapSplit::of(1_000_000_000, 9_500);
        assert_eq!(split.used, 950_000_000);
        assert_eq!(split.reserved, 50_000_000);
        assert_eq!(SwapSplit::of(0, 9_500), SwapSplit { used: 0, reserved: 0 });
    }
}
