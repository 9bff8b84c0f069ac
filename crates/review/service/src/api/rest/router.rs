//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Engine operations
        .route("/view-structure", post(handlers::generate_view_structure))
        .route("/transitions", post(handlers::transition_stage))
        .route("/rules/evaluate", post(handlers::evaluate_rules))
        .route("/rules", get(handlers::list_rules).post(handlers::create_rule))
        // Workflow configs
        .route("/workflows", get(handlers::list_workflows).post(handlers::create_workflow))
        .route("/workflows/:id", get(handlers::get_workflow))
        .route("/workflows/:id/activate", post(handlers::activate_workflow))
        .route("/workflows/:id/deactivate", post(handlers::deactivate_workflow))
        // Approval instances
        .route("/instances/overdue", get(handlers::list_overdue))
        .route("/instances/start", post(handlers::start_instance))
        .route("/instances/re-review", post(handlers::request_re_review))
        .route("/instances/cancel", post(handlers::cancel_instance))
        .route("/instances/:entity_type/:entity_id", get(handlers::get_instance))
        .route(
            "/instances/:entity_type/:entity_id/history",
            get(handlers::get_instance_history),
        );

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
