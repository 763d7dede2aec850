//! Burn executor: destroys acquired tokens and books the burn.
//!
//! Writing the burn record and moving the reward to `burned` form one
//! logical transition. If the burn confirms but either write fails, the
//! reward stays `bought` with its pending burn reference and
//! [`BurnExecutor::record_burned`] repairs it later without burning again.

use std::sync::Arc;

use chrono::Utc;

use crate::capability::ledger::associated_token_account;
use crate::capability::{Capabilities, LedgerGateway, TransactionRequest, TxPolicy};
use crate::config::BurnerConfig;
use crate::domain::amount::apply_bps;
use crate::domain::{
    Address, BurnRecord, EventBus, NewBurn, PipelineEvent, RecordId, RewardRecord,
    RewardTransition, SignerRef, TxRef,
};
use crate::error::PipelineError;
use crate::persistence::Records;

/// One burn order, built from a bought reward.
#[derive(Debug, Clone, PartialEq)]
pub struct BurnRequest {
    /// Reward whose tokens are burned.
    pub reward_id: RecordId,
    /// Tokens credited to the reward (base units) before the safety margin.
    pub amount: u64,
    /// Lamports spent acquiring the tokens.
    pub sol_amount: u64,
    /// USD value of `sol_amount`.
    pub sol_amount_usd: f64,
    /// Swap that acquired the tokens.
    pub buy_tx_ref: TxRef,
}

impl BurnRequest {
    /// Burn order for a `bought` reward; `None` if the swap fields are
    /// missing.
    #[must_use]
    pub fn for_reward(reward: &RewardRecord) -> Option<Self> {
        let amount = reward.tokens_bought?;
        let buy_tx_ref = reward.buy_tx_ref.clone()?;
        let sol_amount = reward.sol_amount_used.unwrap_or(0);
        Some(Self {
            reward_id: reward.id,
            amount,
            sol_amount,
            sol_amount_usd: reward.usd_value_of(sol_amount),
            buy_tx_ref,
        })
    }
}

/// Burns the target token from the authority's token account.
#[derive(Debug, Clone)]
pub struct BurnExecutor {
    ledger: Arc<dyn LedgerGateway>,
    records: Records,
    events: EventBus,
    policy: TxPolicy,
    signer: SignerRef,
    owner: Address,
    mint: Address,
    token_account: Address,
    safety_bps: u16,
}

impl BurnExecutor {
    /// Builds the executor and derives the authority's token account.
    #[must_use]
    pub fn new(
        config: &BurnerConfig,
        capabilities: &Capabilities,
        records: Records,
        events: EventBus,
    ) -> Self {
        let ledger = Arc::clone(&capabilities.ledger);
        let token_account =
            associated_token_account(ledger.as_ref(), &config.authority, &config.target_mint);
        Self {
            ledger,
            records,
            events,
            policy: TxPolicy::from_config(config),
            signer: config.signer.clone(),
            owner: config.authority.clone(),
            mint: config.target_mint.clone(),
            token_account,
            safety_bps: config.burn_safety_bps,
        }
    }

    /// Token account burned from.
    #[must_use]
    pub const fn token_account(&self) -> &Address {
        &self.token_account
    }

    /// Burns `min(amount × safety, held)` tokens for the request's reward.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NothingToBurn`] when the token account is empty;
    ///   the reward is marked failed.
    /// - Submission or ledger failures; the reward is marked failed.
    /// - [`PipelineError::ConfirmationTimeout`] or a record write after
    ///   confirmation; the reward stays `bought` for the reconciler.
    pub async fn burn(&self, request: &BurnRequest) -> Result<BurnRecord, PipelineError> {
        let reward_id = request.reward_id;
        let (tx_ref, amount) = match self.submit(request).await {
            Ok(submitted) => submitted,
            Err(e) => {
                super::mark_failed(&self.records, &self.events, reward_id, &e.to_string()).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .policy
            .await_confirmation(self.ledger.as_ref(), &tx_ref)
            .await
        {
            if matches!(e, PipelineError::ConfirmationTimeout { .. }) {
                tracing::warn!(%reward_id, %tx_ref, "burn unconfirmed; left for reconciliation");
            } else {
                super::mark_failed(&self.records, &self.events, reward_id, &e.to_string()).await;
            }
            return Err(e);
        }

        self.record_burned(request, &tx_ref, amount).await
    }

    async fn submit(&self, request: &BurnRequest) -> Result<(TxRef, u64), PipelineError> {
        let ledger = self.ledger.as_ref();
        let account = &self.token_account;
        let held = self
            .policy
            .retry
            .run("token_balance", move || ledger.get_balance(account))
            .await?;

        let target = apply_bps(request.amount, self.safety_bps);
        let amount = target.min(held);
        if amount == 0 {
            return Err(PipelineError::NothingToBurn {
                account: self.token_account.clone(),
            });
        }
        if amount < target {
            tracing::warn!(
                reward_id = %request.reward_id,
                target,
                held,
                "token balance below recorded purchase; burning what is held"
            );
        }

        let tx = TransactionRequest::Burn {
            mint: self.mint.clone(),
            token_account: self.token_account.clone(),
            owner: self.owner.clone(),
            amount,
        };
        self.records
            .transition_reward(request.reward_id, RewardTransition::BurnIntent)
            .await?;
        let tx_ref = self.policy.submit(ledger, &tx, &self.signer).await?;
        self.records
            .transition_reward(
                request.reward_id,
                RewardTransition::BurnSubmitted {
                    tx_ref: tx_ref.clone(),
                    amount,
                },
            )
            .await?;
        tracing::info!(reward_id = %request.reward_id, %tx_ref, amount, "burn submitted");
        Ok((tx_ref, amount))
    }

    /// Books a confirmed burn: writes the burn record (unless one already
    /// exists for the reward) and moves the reward to `burned`.
    ///
    /// # Errors
    ///
    /// Returns the store error; the reward keeps its pending reference.
    pub async fn record_burned(
        &self,
        request: &BurnRequest,
        tx_ref: &TxRef,
        amount: u64,
    ) -> Result<BurnRecord, PipelineError> {
        let reward_id = request.reward_id;
        let result = async {
            let burn = match self.records.burn_for_reward(reward_id).await? {
                Some(existing) => existing,
                None => {
                    self.records
                        .create_burn(&NewBurn {
                            reward_id,
                            amount,
                            burn_tx_ref: tx_ref.clone(),
                            sol_spent: request.sol_amount,
                            sol_spent_usd: request.sol_amount_usd,
                        })
                        .await?
                }
            };
            self.records
                .transition_reward(reward_id, RewardTransition::Burned)
                .await?;
            Ok::<_, PipelineError>(burn)
        }
        .await;

        let burn = result.map_err(|e| {
            tracing::error!(%reward_id, %tx_ref, error = %e, "burn confirmed but not recorded");
            e
        })?;

        self.events.publish(PipelineEvent::TokensBurned {
            reward_id,
            burn_id: burn.id,
            amount: burn.amount.to_string(),
            tx_ref: burn.burn_tx_ref.to_string(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            %reward_id,
            burn_id = %burn.id,
            tx_ref = %burn.burn_tx_ref,
            amount = burn.amount,
            buy_tx_ref = %request.buy_tx_ref,
            sol_spent = burn.sol_spent,
            "tokens burned"
        );
        Ok(burn)
    }
}
