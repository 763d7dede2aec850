//! Claimable reward detection.

use std::sync::Arc;

use crate::capability::ledger::ClaimAccounts;
use crate::capability::{LedgerGateway, RetryPolicy};
use crate::config::BurnerConfig;
use crate::domain::Address;
use crate::error::PipelineError;

/// Result of a vault check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultStatus {
    /// Lamports that a claim would withdraw.
    pub available: u64,
    /// Whether the vault account exists at all.
    pub exists: bool,
}

/// Reads the reward vault balance through the ledger gateway.
#[derive(Debug, Clone)]
pub struct VaultMonitor {
    ledger: Arc<dyn LedgerGateway>,
    vault: Address,
    rent_reserve: u64,
    retry: RetryPolicy,
}

impl VaultMonitor {
    /// Derives the vault address for the configured authority.
    #[must_use]
    pub fn new(config: &BurnerConfig, ledger: Arc<dyn LedgerGateway>) -> Self {
        let accounts =
            ClaimAccounts::derive(ledger.as_ref(), &config.reward_program_id, &config.authority);
        Self {
            ledger,
            vault: accounts.vault,
            rent_reserve: config.vault_rent_reserve_lamports,
            retry: RetryPolicy::from_config(config),
        }
    }

    /// The monitored vault account.
    #[must_use]
    pub const fn vault(&self) -> &Address {
        &self.vault
    }

    /// Claimable lamports: vault balance minus the rent-exempt reserve.
    ///
    /// A missing or empty vault yields `available = 0` without error.
    ///
    /// # Errors
    ///
    /// Returns the gateway error once read retries are exhausted. It is
    /// never folded into "no rewards".
    pub async fn check_available(&self) -> Result<VaultStatus, PipelineError> {
        let ledger = self.ledger.as_ref();
        let vault = &self.vault;
        let exists = self
            .retry
            .run("vault_exists", move || ledger.get_account_exists(vault))
            .await?;
        if !exists {
            tracing::debug!(%vault, "reward vault does not exist yet");
            return Ok(VaultStatus {
                available: 0,
                exists: false,
            });
        }

        let balance = self
            .retry
            .run("vault_balance", move || ledger.get_balance(vault))
            .await?;
        let available = balance.saturating_sub(self.rent_reserve);
        tracing::debug!(%vault, balance, available, "reward vault checked");
        Ok(VaultStatus {
            available,
            exists: true,
        })
    }
}
