//! Recovery reconciler: repairs records a run left behind.
//!
//! Each pass scans non-terminal reward records older than the grace
//! period, checks their pending transaction references against the
//! ledger, and either advances them (then resumes the next step) or
//! marks them failed. Only a confirmed transaction reference ever
//! advances a status; balances are never used as evidence.
//!
//! | Status    | Evidence                          | Action                          |
//! |-----------|-----------------------------------|---------------------------------|
//! | `pending` | claim never booked                | mark failed                     |
//! | `claimed` | pending buy confirmed             | advance to `bought`, burn       |
//! | `claimed` | pending buy failed / missing      | mark failed                     |
//! | `claimed` | swap intent, no pending buy       | mark failed, never resubmit     |
//! | `claimed` | no intent, no pending buy         | resume swap, then burn          |
//! | `bought`  | burn record exists                | advance to `burned`             |
//! | `bought`  | pending burn confirmed            | write burn record, `burned`     |
//! | `bought`  | pending burn failed / missing     | mark failed                     |
//! | `bought`  | burn intent, no pending burn      | mark failed, never resubmit     |
//! | `bought`  | no intent, no pending burn        | resume burn                     |
//!
//! A separate check compares the latest metrics snapshot's reserve
//! balance against the authority wallet and appends a corrected snapshot
//! on drift.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use super::burn::{BurnExecutor, BurnRequest};
use super::swap::{SwapExecutor, SwapSplit};
use crate::capability::{LedgerGateway, TxPolicy, TxStatus};
use crate::config::BurnerConfig;
use crate::domain::{
    Address, DriftTolerance, EventBus, NewMetricsSnapshot, PipelineEvent, RecordId,
    RewardRecord, RewardStatus, TxRef,
};
use crate::error::PipelineError;
use crate::persistence::{FindOptions, Records};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Records advanced by at least one status.
    pub recovered: u32,
    /// Records marked failed or left in error.
    pub failures: u32,
    /// Count per repair category.
    pub per_category: BTreeMap<String, u32>,
}

impl ReconcileReport {
    fn count(&mut self, category: &str) {
        *self.per_category.entry(category.to_string()).or_default() += 1;
    }
}

/// Result of the metrics drift check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MetricsCheck {
    /// No snapshot existed; a first one was written.
    Baseline {
        /// New snapshot.
        snapshot_id: RecordId,
        /// Observed reserve.
        observed: u64,
    },
    /// Recorded reserve is within tolerance.
    WithinTolerance {
        /// Reserve in the latest snapshot.
        recorded: u64,
        /// Observed reserve.
        observed: u64,
    },
    /// A corrected snapshot was appended.
    Corrected {
        /// New snapshot.
        snapshot_id: RecordId,
        /// Reserve in the previous snapshot.
        recorded: u64,
        /// Observed reserve.
        observed: u64,
    },
}

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repair {
    /// Advanced; the label names the path taken.
    Advanced(&'static str),
    /// A resumed step submitted a transaction that has not confirmed yet.
    InFlight(&'static str),
    /// Marked failed.
    Failed(&'static str),
}

/// Scans stalled reward records and reconciles metrics drift.
#[derive(Debug)]
pub struct Reconciler {
    ledger: Arc<dyn LedgerGateway>,
    records: Records,
    events: EventBus,
    swap: Arc<SwapExecutor>,
    burn: Arc<BurnExecutor>,
    policy: TxPolicy,
    run_lock: Arc<Mutex<()>>,
    grace: chrono::Duration,
    authority: Address,
    total_supply: u64,
    tolerance: DriftTolerance,
}

impl Reconciler {
    /// Builds a reconciler sharing executors and the run lock with the
    /// orchestrator.
    #[must_use]
    pub fn new(
        config: &BurnerConfig,
        ledger: Arc<dyn LedgerGateway>,
        records: Records,
        events: EventBus,
        swap: Arc<SwapExecutor>,
        burn: Arc<BurnExecutor>,
        run_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            ledger,
            records,
            events,
            swap,
            burn,
            policy: TxPolicy::from_config(config),
            run_lock,
            grace: config.reconcile_grace(),
            authority: config.authority.clone(),
            total_supply: config.token_total_supply,
            tolerance: config.drift_tolerance(),
        }
    }

    /// Reconciles every stalled reward record.
    ///
    /// Waits for any in-flight run to finish first. Per-record errors are
    /// counted in the report and do not stop the pass.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RecordStoreCorruption`] or another store
    /// error when the records cannot be listed, and corruption found
    /// while repairing a record.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport, PipelineError> {
        let _guard = self.run_lock.lock().await;
        let Some(cutoff) = Utc::now().checked_sub_signed(self.grace) else {
            return Ok(ReconcileReport::default());
        };
        let stalled = self
            .records
            .find_rewards(
                move |r| !r.status.is_terminal() && r.updated_at <= cutoff,
                FindOptions::oldest_first(),
            )
            .await?;

        let mut report = ReconcileReport::default();
        for record in stalled {
            let reward_id = record.id;
            let from = record.status;
            match self.reconcile_record(record).await {
                Ok(Repair::Advanced(category)) => {
                    report.recovered += 1;
                    report.count(category);
                    self.publish_recovered(reward_id, from).await;
                }
                Ok(Repair::InFlight(category)) => report.count(category),
                Ok(Repair::Failed(category)) => {
                    report.failures += 1;
                    report.count(category);
                }
                Err(e @ PipelineError::RecordStoreCorruption { .. }) => {
                    tracing::error!(%reward_id, error = %e, "reconciliation stopped on corrupt store");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(%reward_id, status = %from, error = %e, "record not reconciled");
                    report.failures += 1;
                    report.count("error");
                }
            }
        }

        if report.recovered > 0 || report.failures > 0 {
            tracing::info!(
                recovered = report.recovered,
                failures = report.failures,
                per_category = ?report.per_category,
                "reconciliation pass finished"
            );
        } else {
            tracing::debug!("reconciliation pass found nothing to repair");
        }
        Ok(report)
    }

    async fn reconcile_record(&self, record: RewardRecord) -> Result<Repair, PipelineError> {
        match record.status {
            RewardStatus::Pending => {
                self.fail(record.id, "claim was never confirmed").await?;
                Ok(Repair::Failed("pending_abandoned"))
            }
            RewardStatus::Claimed => self.reconcile_claimed(record).await,
            RewardStatus::Bought => self.reconcile_bought(record).await,
            RewardStatus::Burned | RewardStatus::Failed => Err(PipelineError::Internal(format!(
                "terminal record {} selected for reconciliation",
                record.id
            ))),
        }
    }

    async fn reconcile_claimed(&self, record: RewardRecord) -> Result<Repair, PipelineError> {
        let reward_id = record.id;
        let Some(tx_ref) = record.pending_buy_tx_ref.clone() else {
            if record.buy_intent_at.is_some() {
                tracing::error!(%reward_id, "swap intent without a transaction reference; not resubmitting");
                self.fail(reward_id, "swap intent recorded without a transaction reference")
                    .await?;
                return Ok(Repair::Failed("buy_intent_unresolved"));
            }
            tracing::info!(%reward_id, "resuming swap for claimed reward");
            return match self.swap.swap(reward_id, record.reward_amount).await {
                Ok(bought) => {
                    self.continue_with_burn(&bought).await;
                    Ok(Repair::Advanced("swap_resumed"))
                }
                Err(PipelineError::ConfirmationTimeout { .. }) => Ok(Repair::InFlight("swap_in_flight")),
                Err(e @ PipelineError::RecordStoreCorruption { .. }) => Err(e),
                // the executor already marked the record failed
                Err(_) => Ok(Repair::Failed("swap_failed")),
            };
        };

        match self.policy.lookup(self.ledger.as_ref(), &tx_ref).await? {
            TxStatus::Confirmed(_) => {
                let split = SwapSplit {
                    used: record.sol_amount_used.unwrap_or(0),
                    reserved: record.sol_amount_reserved.unwrap_or(0),
                };
                let tokens = record.pending_tokens_expected.unwrap_or(0);
                let bought = self
                    .swap
                    .record_bought(reward_id, &tx_ref, tokens, split)
                    .await?;
                tracing::info!(%reward_id, %tx_ref, "late swap confirmation recovered");
                self.continue_with_burn(&bought).await;
                Ok(Repair::Advanced("buy_confirmed"))
            }
            TxStatus::Failed(failure) => {
                self.fail(reward_id, &format!("swap {tx_ref} failed: {failure}"))
                    .await?;
                Ok(Repair::Failed("buy_failed"))
            }
            TxStatus::NotFound | TxStatus::Processing => {
                self.fail(reward_id, &unconfirmed("swap", &tx_ref)).await?;
                Ok(Repair::Failed("buy_unconfirmed"))
            }
        }
    }

    async fn reconcile_bought(&self, record: RewardRecord) -> Result<Repair, PipelineError> {
        let reward_id = record.id;
        let Some(request) = BurnRequest::for_reward(&record) else {
            self.fail(reward_id, "bought record lacks swap details").await?;
            return Ok(Repair::Failed("bought_incomplete"));
        };

        // Burn confirmed and recorded, but the status write was lost.
        if let Some(existing) = self.records.burn_for_reward(reward_id).await? {
            self.burn
                .record_burned(&request, &existing.burn_tx_ref, existing.amount)
                .await?;
            return Ok(Repair::Advanced("burn_status_repaired"));
        }

        let Some(tx_ref) = record.pending_burn_tx_ref.clone() else {
            if record.burn_intent_at.is_some() {
                tracing::error!(%reward_id, "burn intent without a transaction reference; not resubmitting");
                self.fail(reward_id, "burn intent recorded without a transaction reference")
                    .await?;
                return Ok(Repair::Failed("burn_intent_unresolved"));
            }
            tracing::info!(%reward_id, "resuming burn for bought reward");
            return Ok(match self.burn.burn(&request).await {
                Ok(_) => Repair::Advanced("burn_resumed"),
                Err(PipelineError::ConfirmationTimeout { .. }) => Repair::InFlight("burn_in_flight"),
                Err(e @ PipelineError::RecordStoreCorruption { .. }) => return Err(e),
                Err(_) => Repair::Failed("burn_failed"),
            });
        };

        match self.policy.lookup(self.ledger.as_ref(), &tx_ref).await? {
            TxStatus::Confirmed(_) => {
                let amount = record.pending_burn_amount.unwrap_or(request.amount);
                self.burn.record_burned(&request, &tx_ref, amount).await?;
                tracing::info!(%reward_id, %tx_ref, "late burn confirmation recovered");
                Ok(Repair::Advanced("burn_confirmed"))
            }
            TxStatus::Failed(failure) => {
                self.fail(reward_id, &format!("burn {tx_ref} failed: {failure}"))
                    .await?;
                Ok(Repair::Failed("burn_failed"))
            }
            TxStatus::NotFound | TxStatus::Processing => {
                self.fail(reward_id, &unconfirmed("burn", &tx_ref)).await?;
                Ok(Repair::Failed("burn_unconfirmed"))
            }
        }
    }

    /// Runs the burn step for a freshly recovered `bought` record. The
    /// outcome is logged only: the record already advanced and a failed
    /// burn has marked it.
    async fn continue_with_burn(&self, bought: &RewardRecord) {
        let Some(request) = BurnRequest::for_reward(bought) else {
            return;
        };
        if let Err(e) = self.burn.burn(&request).await {
            tracing::warn!(reward_id = %bought.id, error = %e, "burn after recovery did not complete");
        }
    }

    async fn fail(&self, reward_id: RecordId, message: &str) -> Result<(), PipelineError> {
        super::record_failure(&self.records, &self.events, reward_id, message).await
    }

    async fn publish_recovered(&self, reward_id: RecordId, from: RewardStatus) {
        let to = match self.records.get_reward(reward_id).await {
            Ok(Some(record)) => record.status,
            _ => return,
        };
        self.events.publish(PipelineEvent::RecordRecovered {
            reward_id,
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    /// Compares the recorded reserve with the authority wallet balance.
    ///
    /// Writes a baseline snapshot when none exists and a corrected one
    /// when drift exceeds the tolerance. Never touches reward status.
    ///
    /// # Errors
    ///
    /// Returns the gateway error once read retries are exhausted, or a
    /// store error.
    pub async fn reconcile_metrics(&self) -> Result<MetricsCheck, PipelineError> {
        let ledger = self.ledger.as_ref();
        let authority = &self.authority;
        let observed = self
            .policy
            .retry
            .run("reserve_balance", move || ledger.get_balance(authority))
            .await?;

        let latest = self.records.latest_metrics().await?;
        if let Some(previous) = &latest
            && !self.tolerance.exceeded(previous.reserve_balance, observed)
        {
            tracing::debug!(
                recorded = previous.reserve_balance,
                observed,
                "reserve balance within tolerance"
            );
            return Ok(MetricsCheck::WithinTolerance {
                recorded: previous.reserve_balance,
                observed,
            });
        }

        let burns = self.records.list_burns(FindOptions::oldest_first()).await?;
        let corrected =
            NewMetricsSnapshot::corrected(latest.as_ref(), self.total_supply, observed, &burns);
        let snapshot = self.records.append_metrics(&corrected).await?;

        let Some(previous) = latest else {
            tracing::info!(snapshot_id = %snapshot.id, observed, "baseline metrics snapshot written");
            return Ok(MetricsCheck::Baseline {
                snapshot_id: snapshot.id,
                observed,
            });
        };

        self.events.publish(PipelineEvent::MetricsCorrected {
            snapshot_id: snapshot.id,
            recorded_reserve: previous.reserve_balance.to_string(),
            observed_reserve: observed.to_string(),
            timestamp: Utc::now(),
        });
        tracing::warn!(
            snapshot_id = %snapshot.id,
            recorded = previous.reserve_balance,
            observed,
            circulating = snapshot.circulating_supply,
            "reserve drift corrected"
        );
        Ok(MetricsCheck::Corrected {
            snapshot_id: snapshot.id,
            recorded: previous.reserve_balance,
            observed,
        })
    }
}

fn unconfirmed(step: &str, tx_ref: &TxRef) -> String {
    format!("{step} {tx_ref} unconfirmed after grace period")
}
