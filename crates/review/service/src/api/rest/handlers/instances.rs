//! Approval instance handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use review_engine::OverdueStep;
use review_types::{ApprovalInstance, DEFAULT_SCOPE};
use serde::Deserialize;
use serde_json::Value;

/// Get the entity's latest instance
pub async fn get_instance(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<Json<ApprovalInstance>> {
    let instance = state.engine.instance(&entity_type, &entity_id).await?;
    Ok(Json(instance))
}

/// Every instance for the entity, oldest first
pub async fn get_instance_history(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ApprovalInstance>>> {
    let history = state.engine.instance_history(&entity_type, &entity_id).await?;
    Ok(Json(history))
}

/// Start instance request
#[derive(Debug, Deserialize)]
pub struct StartInstanceRequest {
    pub entity_type: String,
    pub entity_id: String,
    pub request_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub entity_data: Value,
}

/// Open an instance at the first step
pub async fn start_instance(
    State(state): State<AppState>,
    Json(request): Json<StartInstanceRequest>,
) -> ApiResult<Json<ApprovalInstance>> {
    let instance = state
        .engine
        .start_instance(
            &request.entity_type,
            &request.entity_id,
            &request.request_type,
            request.scope.as_deref().unwrap_or(DEFAULT_SCOPE),
            &request.entity_data,
        )
        .await?;
    Ok(Json(instance))
}

/// Re-review request
#[derive(Debug, Deserialize)]
pub struct ReReviewRequest {
    pub entity_type: String,
    pub entity_id: String,
    pub request_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Start a new review round after a finished one
pub async fn request_re_review(
    State(state): State<AppState>,
    Json(request): Json<ReReviewRequest>,
) -> ApiResult<Json<ApprovalInstance>> {
    let instance = state
        .engine
        .request_re_review(
            &request.entity_type,
            &request.entity_id,
            &request.request_type,
            request.scope.as_deref().unwrap_or(DEFAULT_SCOPE),
            request.reason,
        )
        .await?;
    Ok(Json(instance))
}

/// Cancel request
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Cancel the entity's open instance
pub async fn cancel_instance(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<ApprovalInstance>> {
    let instance = state
        .engine
        .cancel(&request.entity_type, &request.entity_id, request.reason)
        .await?;
    Ok(Json(instance))
}

/// Overdue query
#[derive(Debug, Deserialize)]
pub struct OverdueQuery {
    /// Evaluation time; defaults to now
    pub at: Option<DateTime<Utc>>,
}

/// In-progress steps past their SLA
pub async fn list_overdue(
    State(state): State<AppState>,
    Query(query): Query<OverdueQuery>,
) -> ApiResult<Json<Vec<OverdueStep>>> {
    let now = query.at.unwrap_or_else(Utc::now);
    let overdue = state.engine.overdue_steps(now).await?;
    Ok(Json(overdue))
}
