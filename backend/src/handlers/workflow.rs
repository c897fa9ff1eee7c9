use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use cadence_shared::WorkflowProspectState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiResult, AppError};
use crate::workflows::PollReport;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct BackfillResponse {
    pub campaign_id: i64,
    pub initialized: usize,
}

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/process", post(process_ready_prospects))
        .route("/prospects/:campaign_prospect_id/initialize", post(initialize_prospect))
        .route("/prospects/:campaign_prospect_id/state", get(get_prospect_state))
        .route("/campaigns/:campaign_id/backfill", post(backfill_campaign))
}

// ==================== Handlers ====================

async fn process_ready_prospects(State(state): State<Arc<AppState>>) -> ApiResult<Json<PollReport>> {
    let report = state.engine.poll().await?;
    Ok(Json(report))
}

async fn initialize_prospect(
    State(state): State<Arc<AppState>>,
    Path(campaign_prospect_id): Path<i64>,
) -> ApiResult<Json<WorkflowProspectState>> {
    let prospect_state = state
        .engine
        .initialize_campaign_prospect(campaign_prospect_id)
        .await?;

    Ok(Json(prospect_state))
}

async fn get_prospect_state(
    State(state): State<Arc<AppState>>,
    Path(campaign_prospect_id): Path<i64>,
) -> ApiResult<Json<WorkflowProspectState>> {
    state
        .engine
        .prospect_state(campaign_prospect_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Workflow state for campaign prospect {}",
                campaign_prospect_id
            ))
        })
}

async fn backfill_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<i64>,
) -> ApiResult<Json<BackfillResponse>> {
    let initialized = state.engine.initialize_campaign(campaign_id).await?;

    Ok(Json(BackfillResponse {
        campaign_id,
        initialized,
    }))
}
