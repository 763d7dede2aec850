//! Manual triggers: pipeline run and reconciliation pass.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{ReconcileResponse, RunResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, PipelineError};

/// `POST /pipeline/run` — Run claim, swap and burn once.
///
/// Expected aborts (nothing to claim, below threshold) and step failures
/// are reported in the body with status 200; the run itself happened.
///
/// # Errors
///
/// Returns [`PipelineError::RunInProgress`] (409) when another run holds
/// the run lock.
#[utoipa::path(
    post,
    path = "/api/v1/pipeline/run",
    tag = "Pipeline",
    summary = "Trigger a pipeline run",
    description = "Runs one claim, swap and burn cycle and returns its outcome.",
    responses(
        (status = 200, description = "Run finished", body = RunResponse),
        (status = 409, description = "A run is already in progress", body = ErrorResponse),
    )
)]
pub async fn run_pipeline(State(state): State<AppState>) -> Result<impl IntoResponse, PipelineError> {
    let report = state.orchestrator.run().await?;
    Ok(Json(RunResponse::from(report)))
}

/// `POST /reconcile` — Repair stalled records and check reserve drift.
///
/// # Errors
///
/// Returns [`PipelineError::RecordStoreCorruption`] when the scan cannot
/// decode the store.
#[utoipa::path(
    post,
    path = "/api/v1/reconcile",
    tag = "Pipeline",
    summary = "Trigger reconciliation",
    description = "Runs one reconciliation pass over stalled records, then the reserve drift check.",
    responses(
        (status = 200, description = "Reconciliation report", body = ReconcileResponse),
        (status = 500, description = "Record store corrupted", body = ErrorResponse),
    )
)]
pub async fn reconcile(State(state): State<AppState>) -> Result<impl IntoResponse, PipelineError> {
    let report = state.reconciler.reconcile_all().await?;
    let metrics = state.reconciler.reconcile_metrics().await;
    Ok(Json(ReconcileResponse::new(report, metrics)))
}

/// Pipeline routes (mounted under `/api/v1`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pipeline/run", post(run_pipeline))
        .route("/reconcile", post(reconcile))
}
