//! Stage transition handler

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use review_types::{TransitionRequest, TransitionResult};

/// Move an entity between stages
pub async fn transition_stage(
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<Json<TransitionResult>> {
    if request.entity_id.trim().is_empty() {
        return Err(ApiError::BadRequest("entity_id must not be empty".to_string()));
    }

    let result = state.engine.transition_stage(request).await?;

    if !result.warnings.is_empty() {
        tracing::warn!(
            entity_id = %result.instance.entity_id,
            stage = %result.current_stage,
            warnings = result.warnings.len(),
            "Transition completed with warnings"
        );
    }

    Ok(Json(result))
}
