//! Rule handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use review_types::{Rule, RuleEvaluationRequest, RuleEvaluationResult};
use serde::Serialize;

/// Evaluate rules for a stage
pub async fn evaluate_rules(
    State(state): State<AppState>,
    Json(request): Json<RuleEvaluationRequest>,
) -> ApiResult<Json<RuleEvaluationResult>> {
    let result = state.engine.evaluate_rules(&request).await?;
    Ok(Json(result))
}

/// List engine-wide rules
pub async fn list_rules(State(state): State<AppState>) -> Json<Vec<Rule>> {
    Json(state.engine.rules().await)
}

/// Create rule response
#[derive(Debug, Serialize)]
pub struct CreateRuleResponse {
    pub id: String,
    pub created: bool,
}

/// Register an engine-wide rule
pub async fn create_rule(
    State(state): State<AppState>,
    Json(rule): Json<Rule>,
) -> ApiResult<Json<CreateRuleResponse>> {
    let id = rule.id.to_string();
    state.engine.add_rule(rule).await?;

    Ok(Json(CreateRuleResponse { id, created: true }))
}
