//! Reward handlers: list and detail.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{
    BurnDto, RewardDetailResponse, RewardDto, RewardListResponse, RewardQuery, clamp_limit,
};
use crate::app_state::AppState;
use crate::domain::{RecordId, RewardStatus};
use crate::error::{ErrorResponse, PipelineError};

/// `GET /rewards` — List rewards, newest first.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRequest`] for an unknown status filter
/// and a persistence error when the store cannot be read.
#[utoipa::path(
    get,
    path = "/api/v1/rewards",
    tag = "Rewards",
    summary = "List rewards",
    description = "Returns reward records newest first, optionally filtered by status.",
    params(RewardQuery),
    responses(
        (status = 200, description = "Reward list", body = RewardListResponse),
        (status = 400, description = "Unknown status filter", body = ErrorResponse),
    )
)]
pub async fn list_rewards(
    State(state): State<AppState>,
    Query(query): Query<RewardQuery>,
) -> Result<impl IntoResponse, PipelineError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RewardStatus>)
        .transpose()
        .map_err(PipelineError::InvalidRequest)?;
    let rewards = state
        .records
        .list_rewards(status, Some(clamp_limit(query.limit)))
        .await?;
    let data: Vec<RewardDto> = rewards.iter().map(RewardDto::from).collect();
    Ok(Json(RewardListResponse {
        count: data.len(),
        data,
    }))
}

/// `GET /rewards/{id}` — One reward with its burn.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRequest`] for a malformed id and
/// [`PipelineError::RecordNotFound`] when no reward has that id.
#[utoipa::path(
    get,
    path = "/api/v1/rewards/{id}",
    tag = "Rewards",
    summary = "Get reward",
    description = "Returns one reward and, once recorded, the burn it funded.",
    params(("id" = String, Path, description = "Reward UUID")),
    responses(
        (status = 200, description = "Reward detail", body = RewardDetailResponse),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Reward not found", body = ErrorResponse),
    )
)]
pub async fn get_reward(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let id: RecordId = id
        .parse()
        .map_err(|e| PipelineError::InvalidRequest(format!("invalid reward id: {e}")))?;
    let reward = state
        .records
        .get_reward(id)
        .await?
        .ok_or(PipelineError::RecordNotFound(id))?;
    let burn = state.records.burn_for_reward(id).await?;
    Ok(Json(RewardDetailResponse {
        reward: RewardDto::from(&reward),
        burn: burn.as_ref().map(BurnDto::from),
    }))
}

/// Reward routes (mounted under `/api/v1`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rewards", get(list_rewards))
        .route("/rewards/{id}", get(get_reward))
}
