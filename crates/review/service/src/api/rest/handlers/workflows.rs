//! Workflow config handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use review_types::{ConfigStatus, WorkflowConfig, WorkflowConfigId};
use serde::Serialize;

/// Workflow summary for listings
#[derive(Debug, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub request_type: String,
    pub scope: String,
    pub name: String,
    pub status: ConfigStatus,
    pub is_default: bool,
    pub stages: Vec<String>,
}

impl From<&WorkflowConfig> for WorkflowSummary {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            id: config.id.to_string(),
            request_type: config.request_type.clone(),
            scope: config.scope.clone(),
            name: config.name.clone(),
            status: config.status,
            is_default: config.is_default,
            stages: config.stages(),
        }
    }
}

/// List all workflow configs
pub async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowSummary>> {
    let workflows = state.engine.workflows().await;
    Json(workflows.iter().map(|w| WorkflowSummary::from(w.as_ref())).collect())
}

/// Get a workflow config
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowConfig>> {
    let config = state.engine.workflow(&WorkflowConfigId::new(id)).await?;
    Ok(Json(config.as_ref().clone()))
}

/// Create workflow response
#[derive(Debug, Serialize)]
pub struct CreateWorkflowResponse {
    pub id: String,
    pub created: bool,
}

/// Register a workflow config
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(config): Json<WorkflowConfig>,
) -> ApiResult<Json<CreateWorkflowResponse>> {
    let id = state.engine.register_workflow(config).await?;

    Ok(Json(CreateWorkflowResponse {
        id: id.to_string(),
        created: true,
    }))
}

/// Activate a workflow config
pub async fn activate_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowSummary>> {
    let config = state.engine.activate_workflow(&WorkflowConfigId::new(id)).await?;
    Ok(Json(WorkflowSummary::from(config.as_ref())))
}

/// Deactivate a workflow config
pub async fn deactivate_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowSummary>> {
    let config = state.engine.deactivate_workflow(&WorkflowConfigId::new(id)).await?;
    Ok(Json(WorkflowSummary::from(config.as_ref())))
}
