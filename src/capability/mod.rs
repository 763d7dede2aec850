//! External capabilities the pipeline depends on.
//!
//! The core only talks to the ledger, the swap aggregator and the price
//! oracle through the traits in this module. Bindings are injected at
//! construction; [`simulated`] provides in-process ones.

pub mod ledger;
pub mod oracle;
pub mod retry;
pub mod simulated;
pub mod swap;

use std::sync::Arc;

pub use ledger::{LedgerGateway, TransactionRequest, TxDetails, TxFailure, TxKind, TxStatus};
pub use oracle::{PriceFeed, PriceOracle, Valuation};
pub use retry::{RetryPolicy, TxPolicy};
pub use swap::{Quote, SwapService, UnsignedTx};

use crate::config::BurnerConfig;
use crate::domain::amount::LAMPORTS_PER_SOL;
use simulated::{SimulatedLedger, SimulatedSwapService, StaticPriceOracle};

/// Simulated price of one SOL in target-token base units.
const SIMULATED_TOKENS_PER_SOL: u64 = 25_000_000_000;

/// Simulated SOL/USD rate.
const SIMULATED_SOL_USD: f64 = 150.0;

/// The capability bindings one service instance runs against.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Ledger access.
    pub ledger: Arc<dyn LedgerGateway>,
    /// Swap aggregator.
    pub swap: Arc<dyn SwapService>,
    /// SOL/USD source.
    pub oracle: Arc<dyn PriceOracle>,
}

impl Capabilities {
    /// Bundles explicit bindings.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        swap: Arc<dyn SwapService>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            ledger,
            swap,
            oracle,
        }
    }

    /// In-process bindings seeded so the first run has something to claim.
    ///
    /// The authority wallet starts with one SOL for fees and the reward
    /// vault with twice the claim threshold above its rent reserve.
    #[must_use]
    pub fn simulated(config: &BurnerConfig) -> Self {
        let ledger = SimulatedLedger::new(config.vault_rent_reserve_lamports);
        let accounts =
            ledger::ClaimAccounts::derive(&ledger, &config.reward_program_id, &config.authority);
        ledger.set_balance(&config.authority, LAMPORTS_PER_SOL);
        ledger.set_balance(
            &accounts.vault,
            config
                .vault_rent_reserve_lamports
                .saturating_add(config.claim_threshold_lamports.saturating_mul(2)),
        );
        tracing::info!(
            authority = %config.authority,
            vault = %accounts.vault,
            "using simulated capabilities"
        );
        Self {
            ledger: Arc::new(ledger),
            swap: Arc::new(SimulatedSwapService::new(SIMULATED_TOKENS_PER_SOL)),
            oracle: Arc::new(StaticPriceOracle::new(Some(SIMULATED_SOL_USD))),
        }
    }
}
