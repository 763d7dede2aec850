//! Shared wiring for the integration tests: simulated capabilities over
//! a caller-chosen record store.

#![allow(dead_code)]

use std::sync::Arc;

use reward_burner::capability::Capabilities;
use reward_burner::capability::ledger::ClaimAccounts;
use reward_burner::capability::simulated::{
    SimulatedLedger, SimulatedSwapService, StaticPriceOracle,
};
use reward_burner::config::BurnerConfig;
use reward_burner::domain::EventBus;
use reward_burner::domain::amount::LAMPORTS_PER_SOL;
use reward_burner::persistence::{MemoryStore, Records};
use reward_burner::service::Services;

/// Simulated price: one SOL buys this many token base units.
pub const TOKENS_PER_SOL: u64 = 1_000_000_000;

/// A wired service instance.
#[derive(Debug)]
pub struct Rig {
    pub config: BurnerConfig,
    pub ledger: Arc<SimulatedLedger>,
    pub swap_service: Arc<SimulatedSwapService>,
    pub records: Records,
    pub events: EventBus,
    pub services: Services,
}

/// Fast retry and confirmation settings with no reconcile grace period.
pub fn fast_config() -> BurnerConfig {
    BurnerConfig {
        retry_base_ms: 1,
        retry_max_ms: 2,
        confirm_timeout_secs: 0,
        confirm_poll_ms: 1,
        reconcile_grace_secs: 0,
        ..BurnerConfig::default()
    }
}

impl Rig {
    pub fn in_memory() -> Self {
        Self::with_records(fast_config(), Records::new(Arc::new(MemoryStore::new())))
    }

    pub fn with_records(config: BurnerConfig, records: Records) -> Self {
        let ledger = Arc::new(SimulatedLedger::new(config.vault_rent_reserve_lamports));
        ledger.set_balance(&config.authority, LAMPORTS_PER_SOL);
        Self::with_ledger(config, records, ledger)
    }

    /// Wires a fresh service instance over an existing ledger, as after a
    /// process restart.
    pub fn with_ledger(config: BurnerConfig, records: Records, ledger: Arc<SimulatedLedger>) -> Self {
        let swap_service = Arc::new(SimulatedSwapService::new(TOKENS_PER_SOL));
        let capabilities = Capabilities::new(
            Arc::clone(&ledger) as _,
            Arc::clone(&swap_service) as _,
            Arc::new(StaticPriceOracle::new(Some(150.0))),
        );
        let events = EventBus::new(64);
        let services = Services::new(&config, &capabilities, &records, &events, None);
        Self {
            config,
            ledger,
            swap_service,
            records,
            events,
            services,
        }
    }

    /// Puts `claimable` lamports in the vault on top of its rent reserve.
    pub fn seed_vault(&self, claimable: u64) {
        let accounts = ClaimAccounts::derive(
            self.ledger.as_ref(),
            &self.config.reward_program_id,
            &self.config.authority,
        );
        self.ledger.set_balance(
            &accounts.vault,
            self.config.vault_rent_reserve_lamports + claimable,
        );
    }
}
