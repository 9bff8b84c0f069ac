//! View structure handler

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use review_types::{ViewRequest, ViewStructure};

/// Generate the role-filtered view for a stage
pub async fn generate_view_structure(
    State(state): State<AppState>,
    Json(request): Json<ViewRequest>,
) -> ApiResult<Json<ViewStructure>> {
    let view = state.engine.generate_view_structure(&request).await?;
    Ok(Json(view))
}
