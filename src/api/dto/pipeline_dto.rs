//! DTOs for the manual run and reconcile triggers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::service::{MetricsCheck, ReconcileReport, RunOutcome, RunReport};

/// Response body for `POST /pipeline/run`.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct RunResponse {
    /// Run correlation id.
    pub run_id: String,
    /// `completed`, `aborted`, `failed` or `cancelled`.
    pub outcome: String,
    /// Start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Failing step, or the step a cancelled run stopped before.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Reward booked by the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<uuid::Uuid>,
    /// Abort reason or step error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Claimable or claimed lamports (string-encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lamports: Option<String>,
    /// Tokens bought (string-encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_bought: Option<String>,
    /// Tokens burned (string-encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_burned: Option<String>,
    /// Claim, swap and burn transactions of a completed run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tx_refs: Vec<String>,
}

impl From<RunReport> for RunResponse {
    fn from(report: RunReport) -> Self {
        let base = Self {
            run_id: report.run_id,
            outcome: report.outcome.label().to_string(),
            started_at: Some(report.started_at),
            duration_ms: report.duration_ms,
            ..Self::default()
        };
        match report.outcome {
            RunOutcome::Completed {
                reward_id,
                claimed_lamports,
                tokens_bought,
                tokens_burned,
                claim_tx_ref,
                buy_tx_ref,
                burn_tx_ref,
            } => Self {
                reward_id: Some(*reward_id.as_uuid()),
                lamports: Some(claimed_lamports.to_string()),
                tokens_bought: Some(tokens_bought.to_string()),
                tokens_burned: Some(tokens_burned.to_string()),
                tx_refs: vec![
                    claim_tx_ref.to_string(),
                    buy_tx_ref.to_string(),
                    burn_tx_ref.to_string(),
                ],
                ..base
            },
            RunOutcome::Aborted { reason, available } => Self {
                message: Some(reason),
                lamports: Some(available.to_string()),
                ..base
            },
            RunOutcome::Failed {
                step,
                error,
                reward_id,
            } => Self {
                step: Some(step.to_string()),
                message: Some(error),
                reward_id: reward_id.map(|id| *id.as_uuid()),
                ..base
            },
            RunOutcome::Cancelled { before, reward_id } => Self {
                step: Some(before.to_string()),
                reward_id: reward_id.map(|id| *id.as_uuid()),
                ..base
            },
        }
    }
}

/// Outcome of the reserve drift check.
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsCheckDto {
    /// `baseline`, `within_tolerance` or `corrected`.
    pub result: String,
    /// Reserve in the previous snapshot (string-encoded).
    pub recorded: Option<String>,
    /// Observed wallet balance (string-encoded).
    pub observed: String,
    /// Snapshot written by the check.
    pub snapshot_id: Option<uuid::Uuid>,
}

impl From<MetricsCheck> for MetricsCheckDto {
    fn from(check: MetricsCheck) -> Self {
        match check {
            MetricsCheck::Baseline {
                snapshot_id,
                observed,
            } => Self {
                result: "baseline".to_string(),
                recorded: None,
                observed: observed.to_string(),
                snapshot_id: Some(*snapshot_id.as_uuid()),
            },
            MetricsCheck::WithinTolerance { recorded, observed } => Self {
                result: "within_tolerance".to_string(),
                recorded: Some(recorded.to_string()),
                observed: observed.to_string(),
                snapshot_id: None,
            },
            MetricsCheck::Corrected {
                snapshot_id,
                recorded,
                observed,
            } => Self {
                result: "corrected".to_string(),
                recorded: Some(recorded.to_string()),
                observed: observed.to_string(),
                snapshot_id: Some(*snapshot_id.as_uuid()),
            },
        }
    }
}

/// Response body for `POST /reconcile`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileResponse {
    /// Records advanced.
    pub recovered: u32,
    /// Records marked failed or left in error.
    pub failures: u32,
    /// Count per repair category.
    pub per_category: BTreeMap<String, u32>,
    /// Drift check result, when it ran.
    pub metrics: Option<MetricsCheckDto>,
    /// Drift check error, when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_error: Option<String>,
}

impl ReconcileResponse {
    /// Combines a reconciliation report with the drift check result.
    #[must_use]
    pub fn new(
        report: ReconcileReport,
        metrics: Result<MetricsCheck, crate::error::PipelineError>,
    ) -> Self {
        let (metrics, metrics_error) = match metrics {
            Ok(check) => (Some(check.into()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            recovered: report.recovered,
            failures: report.failures,
            per_category: report.per_category,
            metrics,
            metrics_error,
        }
    }
}
