//! Pipeline orchestrator: one end-to-end claim → swap → burn run.
//!
//! ```text
//! CheckThreshold ──▶ Claim ──▶ Swap ──▶ Burn ──▶ Completed
//!       │              │         │        │
//!       ▼              └─────────┴────────┴──▶ Failed{step}
//!    Aborted
//! ```
//!
//! Runs are single-flight: a second caller gets
//! [`PipelineError::RunInProgress`]. Cancellation is honoured only at
//! step boundaries, never while a submitted transaction is outstanding.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};

use super::burn::{BurnExecutor, BurnRequest};
use super::claim::ClaimExecutor;
use super::swap::SwapExecutor;
use super::vault_monitor::VaultMonitor;
use crate::config::BurnerConfig;
use crate::domain::{EventBus, PipelineEvent, RecordId, TxRef};
use crate::error::PipelineError;

/// Pipeline step, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Vault balance and threshold gate.
    CheckThreshold,
    /// Claim transaction.
    Claim,
    /// Swap transaction.
    Swap,
    /// Burn transaction.
    Burn,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CheckThreshold => "check_threshold",
            Self::Claim => "claim",
            Self::Swap => "swap",
            Self::Burn => "burn",
        })
    }
}

/// Terminal state of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// All four steps succeeded.
    Completed {
        /// Reward record of this run.
        reward_id: RecordId,
        /// Claimed lamports.
        claimed_lamports: u64,
        /// Tokens credited by the swap.
        tokens_bought: u64,
        /// Tokens destroyed.
        tokens_burned: u64,
        /// Claim transaction.
        claim_tx_ref: TxRef,
        /// Swap transaction.
        buy_tx_ref: TxRef,
        /// Burn transaction.
        burn_tx_ref: TxRef,
    },
    /// Stopped at the threshold gate before any side effect.
    Aborted {
        /// Why the run stopped.
        reason: String,
        /// Claimable lamports observed.
        available: u64,
    },
    /// A step failed; later steps did not run.
    Failed {
        /// Failing step.
        step: PipelineStep,
        /// Error message.
        error: String,
        /// Reward record, when the claim had been booked.
        reward_id: Option<RecordId>,
    },
    /// Shutdown was requested between steps.
    Cancelled {
        /// Step that would have run next.
        before: PipelineStep,
        /// Reward record, when the claim had been booked.
        reward_id: Option<RecordId>,
    },
}

impl RunOutcome {
    /// Short outcome label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Aborted { .. } => "aborted",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Structured result of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Correlation id shared by the run's events.
    pub run_id: String,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Terminal state.
    pub outcome: RunOutcome,
}

/// Sequences the vault monitor and the three executors.
#[derive(Debug)]
pub struct Orchestrator {
    monitor: VaultMonitor,
    claim: ClaimExecutor,
    swap: Arc<SwapExecutor>,
    burn: Arc<BurnExecutor>,
    events: EventBus,
    run_lock: Arc<Mutex<()>>,
    shutdown: Option<watch::Receiver<bool>>,
    claim_threshold: u64,
}

impl Orchestrator {
    /// Assembles an orchestrator. `run_lock` is shared with the
    /// reconciler so the two never interleave.
    #[must_use]
    pub fn new(
        config: &BurnerConfig,
        monitor: VaultMonitor,
        claim: ClaimExecutor,
        swap: Arc<SwapExecutor>,
        burn: Arc<BurnExecutor>,
        events: EventBus,
        run_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            monitor,
            claim,
            swap,
            burn,
            events,
            run_lock,
            shutdown: None,
            claim_threshold: config.claim_threshold_lamports,
        }
    }

    /// Observes `shutdown` at step boundaries.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Executes one run to a terminal outcome.
    ///
    /// Step failures are reported in the returned [`RunReport`], not as
    /// an `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RunInProgress`] when another run (or a
    /// reconciliation pass) holds the run lock.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::debug!("pipeline run skipped: another run is in progress");
            return Err(PipelineError::RunInProgress);
        };

        let run_id = RecordId::new().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        self.events.publish(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
            timestamp: started_at,
        });
        tracing::info!(%run_id, "pipeline run started");

        let outcome = self.execute().await;

        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.events.publish(PipelineEvent::RunFinished {
            run_id: run_id.clone(),
            outcome: outcome.label().to_string(),
            duration_ms,
            timestamp: Utc::now(),
        });
        log_summary(&run_id, &outcome, duration_ms);

        Ok(RunReport {
            run_id,
            started_at,
            duration_ms,
            outcome,
        })
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn execute(&self) -> RunOutcome {
        // CheckThreshold
        let status = match self.monitor.check_available().await {
            Ok(status) => status,
            Err(e) => return failed(PipelineStep::CheckThreshold, &e, None),
        };
        if status.available == 0 {
            return RunOutcome::Aborted {
                reason: PipelineError::NoRewardsAvailable.to_string(),
                available: 0,
            };
        }
        if status.available < self.claim_threshold {
            return RunOutcome::Aborted {
                reason: PipelineError::BelowThreshold {
                    available: status.available,
                    threshold: self.claim_threshold,
                }
                .to_string(),
                available: status.available,
            };
        }

        // Claim
        if self.cancelled() {
            return RunOutcome::Cancelled {
                before: PipelineStep::Claim,
                reward_id: None,
            };
        }
        let reward = match self.claim.claim(status.available).await {
            Ok(reward) => reward,
            Err(e) if e.is_expected_abort() => {
                return RunOutcome::Aborted {
                    reason: e.to_string(),
                    available: status.available,
                };
            }
            Err(e) => return failed(PipelineStep::Claim, &e, None),
        };
        let reward_id = reward.id;
        let Some(claim_tx_ref) = reward.claim_tx_ref.clone() else {
            let e = PipelineError::Internal("claimed record lacks its claim reference".to_string());
            return failed(PipelineStep::Claim, &e, Some(reward_id));
        };

        // Swap
        if self.cancelled() {
            return RunOutcome::Cancelled {
                before: PipelineStep::Swap,
                reward_id: Some(reward_id),
            };
        }
        let bought = match self.swap.swap(reward_id, reward.reward_amount).await {
            Ok(bought) => bought,
            Err(e) => return failed(PipelineStep::Swap, &e, Some(reward_id)),
        };
        let Some(request) = BurnRequest::for_reward(&bought) else {
            let e = PipelineError::Internal("bought record lacks swap fields".to_string());
            return failed(PipelineStep::Swap, &e, Some(reward_id));
        };

        // Burn
        if self.cancelled() {
            return RunOutcome::Cancelled {
                before: PipelineStep::Burn,
                reward_id: Some(reward_id),
            };
        }
        let burn = match self.burn.burn(&request).await {
            Ok(burn) => burn,
            Err(e) => return failed(PipelineStep::Burn, &e, Some(reward_id)),
        };

        RunOutcome::Completed {
            reward_id,
            claimed_lamports: reward.reward_amount,
            tokens_bought: request.amount,
            tokens_burned: burn.amount,
            claim_tx_ref,
            buy_tx_ref: request.buy_tx_ref,
            burn_tx_ref: burn.burn_tx_ref,
        }
    }
}

fn failed(step: PipelineStep, error: &PipelineError, reward_id: Option<RecordId>) -> RunOutcome {
    RunOutcome::Failed {
        step,
        error: error.to_string(),
        reward_id,
    }
}

fn log_summary(run_id: &str, outcome: &RunOutcome, duration_ms: u64) {
    match outcome {
        RunOutcome::Completed {
            reward_id,
            claimed_lamports,
            tokens_bought,
            tokens_burned,
            claim_tx_ref,
            buy_tx_ref,
            burn_tx_ref,
        } => tracing::info!(
            run_id,
            outcome = "completed",
            %reward_id,
            claimed_lamports,
            tokens_bought,
            tokens_burned,
            %claim_tx_ref,
            %buy_tx_ref,
            %burn_tx_ref,
            duration_ms,
            "pipeline run finished"
        ),
        RunOutcome::Aborted { reason, available } => tracing::info!(
            run_id,
            outcome = "aborted",
            available,
            reason = %reason,
            duration_ms,
            "pipeline run finished"
        ),
        RunOutcome::Failed {
            step,
            error,
            reward_id,
        } => tracing::warn!(
            run_id,
            outcome = "failed",
            %step,
            reward_id = ?reward_id,
            error = %error,
            duration_ms,
            "pipeline run finished"
        ),
        RunOutcome::Cancelled { before, reward_id } => tracing::warn!(
            run_id,
            outcome = "cancelled",
            before = %before,
            reward_id = ?reward_id,
            duration_ms,
            "pipeline run finished"
        ),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::capability::TxKind;
    use crate::capability::simulated::ConfirmMode;
    use crate::domain::RewardStatus;
    use crate::persistence::FindOptions;
    use crate::service::Services;
    use crate::service::test_support::Harness;

    #[tokio::test]
    async fn below_threshold_aborts_without_side_effects() {
        let h = Harness::with_config(|c| c.claim_threshold_lamports = 300_000_000);
        h.seed_vault(200_000_000);

        let Ok(report) = h.orchestrator.run().await else {
            panic!("run lock free");
        };
        let RunOutcome::Aborted { available, .. } = report.outcome else {
            panic!("expected abort, got {:?}", report.outcome);
        };
        assert_eq!(available, 200_000_000);
        assert_eq!(h.ledger.submission_count(), 0);
        let Ok(rewards) = h.records.list_rewards(None, None).await else {
            panic!("list failed");
        };
        assert!(rewards.is_empty());
    }

    #[tokio::test]
    async fn empty_vault_aborts_as_no_rewards() {
        let h = Harness::new();
        let Ok(report) = h.orchestrator.run().await else {
            panic!("run lock free");
        };
        assert!(matches!(
            report.outcome,
            RunOutcome::Aborted { available: 0, .. }
        ));
    }

    #[tokio::test]
    async fn happy_path_burns_and_links_records() {
        let h = Harness::new();
        h.seed_vault(500_000_000);
        let mut rx = h.events.subscribe();

        let Ok(report) = h.orchestrator.run().await else {
            panic!("run lock free");
        };
        let RunOutcome::Completed {
            reward_id,
            claimed_lamports,
            tokens_bought,
            tokens_burned,
            claim_tx_ref,
            buy_tx_ref,
            ..
        } = report.outcome
        else {
            panic!("expected completion, got {:?}", report.outcome);
        };
        assert_eq!(claimed_lamports, 500_000_000);
        assert!(tokens_burned > 0 && tokens_burned <= tokens_bought);
        assert!(!claim_tx_ref.as_str().is_empty());

        let Ok(Some(reward)) = h.records.get_reward(reward_id).await else {
            panic!("reward missing");
        };
        assert_eq!(reward.status, RewardStatus::Burned);
        assert_eq!(reward.claim_tx_ref, Some(claim_tx_ref));
        assert_eq!(reward.buy_tx_ref, Some(buy_tx_ref));
        let Ok(burns) = h.records.list_burns(FindOptions::oldest_first()).await else {
            panic!("burns failed");
        };
        assert_eq!(burns.len(), 1);
        assert!(burns.iter().all(|b| b.reward_id == reward_id));

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event.event_type_str());
        }
        assert_eq!(
            seen,
            vec![
                "run_started",
                "reward_claimed",
                "tokens_bought",
                "tokens_burned",
                "run_finished"
            ]
        );
    }

    #[tokio::test]
    async fn swap_service_failure_keeps_the_claim() {
        let h = Harness::new();
        h.seed_vault(500_000_000);
        h.swap_service.fail_next_quotes(100);

        let Ok(report) = h.orchestrator.run().await else {
            panic!("run lock free");
        };
        let RunOutcome::Failed {
            step,
            reward_id: Some(reward_id),
            ..
        } = report.outcome
        else {
            panic!("expected swap failure, got {:?}", report.outcome);
        };
        assert_eq!(step, PipelineStep::Swap);

        let Ok(Some(reward)) = h.records.get_reward(reward_id).await else {
            panic!("reward missing");
        };
        assert_eq!(reward.status, RewardStatus::Failed);
        assert!(reward.error_message.is_some());
        assert!(reward.claim_tx_ref.is_some());
        assert_eq!(h.ledger.submissions_of(TxKind::Swap), 0);
    }

    #[tokio::test]
    async fn slippage_rejection_marks_the_reward_failed() {
        let h = Harness::new();
        h.seed_vault(500_000_000);
        h.ledger.set_fill_bps(5_000);

        let Ok(report) = h.orchestrator.run().await else {
            panic!("run lock free");
        };
        assert!(matches!(
            report.outcome,
            RunOutcome::Failed {
                step: PipelineStep::Swap,
                ..
            }
        ));
        let Ok(failed) = h.records.list_rewards(Some(RewardStatus::Failed), None).await else {
            panic!("list failed");
        };
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn overlapping_runs_are_rejected() {
        let h = Harness::with_config(|c| {
            c.confirm_timeout_secs = 1;
            c.confirm_poll_ms = 5;
        });
        h.seed_vault(500_000_000);
        h.ledger.set_confirm_mode(TxKind::Swap, ConfirmMode::Withhold);

        let (first, second) = tokio::join!(h.orchestrator.run(), h.orchestrator.run());
        assert!(first.is_ok());
        assert!(matches!(second, Err(PipelineError::RunInProgress)));
        assert_eq!(h.ledger.submissions_of(TxKind::Claim), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_at_the_next_boundary() {
        let h = Harness::new();
        h.seed_vault(500_000_000);
        let (tx, rx) = watch::channel(true);
        let services = Services::new(&h.config, &h.capabilities, &h.records, &h.events, Some(rx));

        let Ok(report) = services.orchestrator.run().await else {
            panic!("run lock free");
        };
        assert_eq!(
            report.outcome,
            RunOutcome::Cancelled {
                before: PipelineStep::Claim,
                reward_id: None
            }
        );
        assert_eq!(h.ledger.submission_count(), 0);
        drop(tx);
    }
}
