//! Burn, metrics and milestone handlers.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{
    BurnDto, BurnListResponse, LimitQuery, MetricsDto, MetricsResponse, MilestoneDto,
    MilestoneListResponse, clamp_limit,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, PipelineError};
use crate::persistence::FindOptions;

/// `GET /burns` — List confirmed burns, newest first.
///
/// # Errors
///
/// Returns a persistence error when the store cannot be read.
#[utoipa::path(
    get,
    path = "/api/v1/burns",
    tag = "Records",
    summary = "List burns",
    description = "Returns burn records newest first with the total burned across the page.",
    params(LimitQuery),
    responses(
        (status = 200, description = "Burn list", body = BurnListResponse),
        (status = 500, description = "Store unreadable", body = ErrorResponse),
    )
)]
pub async fn list_burns(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, PipelineError> {
    let burns = state
        .records
        .list_burns(FindOptions::latest(clamp_limit(query.limit)))
        .await?;
    let total: u128 = burns.iter().map(|b| u128::from(b.amount)).sum();
    let data: Vec<BurnDto> = burns.iter().map(BurnDto::from).collect();
    Ok(Json(BurnListResponse {
        count: data.len(),
        total_burned: total.to_string(),
        data,
    }))
}

/// `GET /metrics/latest` — Newest supply and reserve snapshot.
///
/// # Errors
///
/// Returns a persistence error when the store cannot be read.
#[utoipa::path(
    get,
    path = "/api/v1/metrics/latest",
    tag = "Records",
    summary = "Latest metrics snapshot",
    description = "Returns the newest metrics snapshot, or `data: null` before the first one.",
    responses(
        (status = 200, description = "Latest snapshot", body = MetricsResponse),
        (status = 500, description = "Store unreadable", body = ErrorResponse),
    )
)]
pub async fn latest_metrics(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PipelineError> {
    let latest = state.records.latest_metrics().await?;
    Ok(Json(MetricsResponse {
        data: latest.as_ref().map(MetricsDto::from),
    }))
}

/// `GET /milestones` — Market-cap burn milestones.
///
/// # Errors
///
/// Returns a persistence error when the store cannot be read.
#[utoipa::path(
    get,
    path = "/api/v1/milestones",
    tag = "Records",
    summary = "List milestones",
    responses(
        (status = 200, description = "Milestone list", body = MilestoneListResponse),
        (status = 500, description = "Store unreadable", body = ErrorResponse),
    )
)]
pub async fn list_milestones(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PipelineError> {
    let milestones = state.records.list_milestones().await?;
    let data: Vec<MilestoneDto> = milestones.iter().map(MilestoneDto::from).collect();
    Ok(Json(MilestoneListResponse {
        count: data.len(),
        data,
    }))
}

/// Record routes (mounted under `/api/v1`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/burns", get(list_burns))
        .route("/metrics/latest", get(latest_metrics))
        .route("/milestones", get(list_milestones))
}
