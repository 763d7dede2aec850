//! OpenAPI document for the read API.

use utoipa::OpenApi;

use crate::api::dto::{
    BurnDto, BurnListResponse, MetricsCheckDto, MetricsDto, MetricsResponse, MilestoneDto,
    MilestoneListResponse, ReconcileResponse, RewardDetailResponse, RewardDto,
    RewardListResponse, RunResponse,
};
use crate::api::handlers::{pipeline, records, rewards, system};
use crate::error::{ErrorBody, ErrorResponse};

/// Collected paths and schemas served at `/openapi.json`.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "reward-burner",
        description = "Read API and manual triggers for the claim, swap and burn pipeline."
    ),
    paths(
        system::health_handler,
        rewards::list_rewards,
        rewards::get_reward,
        records::list_burns,
        records::latest_metrics,
        records::list_milestones,
        pipeline::run_pipeline,
        pipeline::reconcile,
    ),
    components(schemas(
        system::HealthResponse,
        RewardDto,
        RewardListResponse,
        RewardDetailResponse,
        BurnDto,
        BurnListResponse,
        MetricsDto,
        MetricsResponse,
        MilestoneDto,
        MilestoneListResponse,
        RunResponse,
        MetricsCheckDto,
        ReconcileResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Health and API metadata"),
        (name = "Rewards", description = "Reward records"),
        (name = "Records", description = "Burns, metrics snapshots and milestones"),
        (name = "Pipeline", description = "Manual run and reconcile triggers"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/health",
            "/api/v1/rewards",
            "/api/v1/rewards/{id}",
            "/api/v1/burns",
            "/api/v1/metrics/latest",
            "/api/v1/milestones",
            "/api/v1/pipeline/run",
            "/api/v1/reconcile",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
