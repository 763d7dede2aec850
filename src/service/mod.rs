//! Service layer: the pipeline steps and what drives them.
//!
//! [`VaultMonitor`] and the claim, swap and burn executors each own one
//! step. [`Orchestrator`] sequences them into a run, [`Reconciler`]
//! repairs what runs leave behind and [`Scheduler`] ticks both. The
//! orchestrator and reconciler share one run lock so they never touch
//! the same records concurrently.

pub mod burn;
pub mod claim;
pub mod orchestrator;
pub mod reconciler;
pub mod scheduler;
pub mod swap;
pub mod vault_monitor;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, watch};

pub use burn::{BurnExecutor, BurnRequest};
pub use claim::ClaimExecutor;
pub use orchestrator::{Orchestrator, PipelineStep, RunOutcome, RunReport};
pub use reconciler::{MetricsCheck, ReconcileReport, Reconciler};
pub use scheduler::Scheduler;
pub use swap::{SwapExecutor, SwapSplit};
pub use vault_monitor::{VaultMonitor, VaultStatus};

use crate::capability::Capabilities;
use crate::config::BurnerConfig;
use crate::domain::{EventBus, PipelineEvent, RecordId, RewardTransition};
use crate::error::PipelineError;
use crate::persistence::Records;

/// The wired orchestrator and reconciler of one service instance.
#[derive(Debug, Clone)]
pub struct Services {
    /// Pipeline runs.
    pub orchestrator: Arc<Orchestrator>,
    /// Recovery and drift passes.
    pub reconciler: Arc<Reconciler>,
}

impl Services {
    /// Wires every step against `capabilities` and `records`.
    ///
    /// When `shutdown` is given, runs stop at the next step boundary once
    /// it turns `true`.
    #[must_use]
    pub fn new(
        config: &BurnerConfig,
        capabilities: &Capabilities,
        records: &Records,
        events: &EventBus,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Self {
        let run_lock = Arc::new(Mutex::new(()));
        let swap = Arc::new(SwapExecutor::new(
            config,
            capabilities,
            records.clone(),
            events.clone(),
        ));
        let burn = Arc::new(BurnExecutor::new(
            config,
            capabilities,
            records.clone(),
            events.clone(),
        ));

        let mut orchestrator = Orchestrator::new(
            config,
            VaultMonitor::new(config, Arc::clone(&capabilities.ledger)),
            ClaimExecutor::new(config, capabilities, records.clone(), events.clone()),
            Arc::clone(&swap),
            Arc::clone(&burn),
            events.clone(),
            Arc::clone(&run_lock),
        );
        if let Some(shutdown) = shutdown {
            orchestrator = orchestrator.with_shutdown(shutdown);
        }

        let reconciler = Reconciler::new(
            config,
            Arc::clone(&capabilities.ledger),
            records.clone(),
            events.clone(),
            swap,
            burn,
            run_lock,
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            reconciler: Arc::new(reconciler),
        }
    }
}

/// Moves reward `reward_id` to `failed` and announces it.
///
/// # Errors
///
/// Returns the store error when the transition cannot be written.
pub(crate) async fn record_failure(
    records: &Records,
    events: &EventBus,
    reward_id: RecordId,
    message: &str,
) -> Result<(), PipelineError> {
    records
        .transition_reward(
            reward_id,
            RewardTransition::Failed {
                message: message.to_string(),
            },
        )
        .await?;
    events.publish(PipelineEvent::RecordFailed {
        reward_id,
        reason: message.to_string(),
        timestamp: Utc::now(),
    });
    tracing::warn!(%reward_id, reason = message, "reward marked failed");
    Ok(())
}

/// [`record_failure`] for step error paths, where the original error is
/// what gets returned and a failed write can only be logged.
pub(crate) async fn mark_failed(
    records: &Records,
    events: &EventBus,
    reward_id: RecordId,
    message: &str,
) {
    if let Err(e) = record_failure(records, events, reward_id, message).await {
        tracing::error!(%reward_id, reason = message, error = %e, "could not mark reward failed");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-process wiring over simulated capabilities and a memory store.

    use std::sync::Arc;

    use super::{Orchestrator, Reconciler, Services};
    use crate::capability::Capabilities;
    use crate::capability::ledger::ClaimAccounts;
    use crate::capability::simulated::{SimulatedLedger, SimulatedSwapService, StaticPriceOracle};
    use crate::config::{BurnerConfig, StoreBackend};
    use crate::domain::EventBus;
    use crate::domain::amount::LAMPORTS_PER_SOL;
    use crate::persistence::{MemoryStore, RecordStore, Records};

    /// Simulated tokens per SOL used by the harness.
    pub(crate) const TOKENS_PER_SOL: u64 = 1_000_000_000;

    #[derive(Debug)]
    pub(crate) struct Harness {
        pub(crate) config: BurnerConfig,
        pub(crate) ledger: Arc<SimulatedLedger>,
        pub(crate) swap_service: Arc<SimulatedSwapService>,
        pub(crate) capabilities: Capabilities,
        pub(crate) records: Records,
        pub(crate) events: EventBus,
        pub(crate) orchestrator: Arc<Orchestrator>,
        pub(crate) reconciler: Arc<Reconciler>,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            Self::with_config(|_| {})
        }

        pub(crate) fn with_config(tweak: impl FnOnce(&mut BurnerConfig)) -> Self {
            Self::with_store(tweak, Arc::new(MemoryStore::new()))
        }

        pub(crate) fn with_store(
            tweak: impl FnOnce(&mut BurnerConfig),
            store: Arc<dyn RecordStore>,
        ) -> Self {
            let mut config = BurnerConfig {
                store_backend: StoreBackend::Memory,
                retry_base_ms: 1,
                retry_max_ms: 2,
                confirm_timeout_secs: 0,
                confirm_poll_ms: 1,
                reconcile_grace_secs: 0,
                ..BurnerConfig::default()
            };
            tweak(&mut config);

            let ledger = Arc::new(SimulatedLedger::new(config.vault_rent_reserve_lamports));
            ledger.set_balance(&config.authority, LAMPORTS_PER_SOL);
            let swap_service = Arc::new(SimulatedSwapService::new(TOKENS_PER_SOL));
            let capabilities = Capabilities::new(
                Arc::clone(&ledger) as _,
                Arc::clone(&swap_service) as _,
                Arc::new(StaticPriceOracle::new(Some(150.0))),
            );
            let records = Records::new(store);
            let events = EventBus::new(64);
            let services = Services::new(&config, &capabilities, &records, &events, None);

            Self {
                config,
                ledger,
                swap_service,
                capabilities,
                records,
                events,
                orchestrator: services.orchestrator,
                reconciler: services.reconciler,
            }
        }

        /// Puts `claimable` lamports in the vault on top of its rent reserve.
        pub(crate) fn seed_vault(&self, claimable: u64) {
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
}
