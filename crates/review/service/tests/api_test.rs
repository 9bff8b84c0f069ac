//! HTTP surface tests driven through the router without a socket

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use review_engine::EngineConfig;
use review_service::api::create_router;
use review_service::api::rest::state::AppState;
use review_service::Catalog;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const CATALOG: &str = r#"{
    "workflows": [{
        "id": "agent-v1",
        "request_type": "agent",
        "name": "Agent onboarding",
        "is_default": true,
        "status": "active",
        "workflow_steps": [
            {"step_number": 1, "step_type": "review", "is_first_step": true, "assigned_role": "analyst"},
            {"step_number": 2, "step_type": "approval", "assigned_role": "approver", "due_in_days": 3}
        ]
    }],
    "rules": [{
        "id": "high-risk",
        "entity_type": "agent",
        "workflow_stage": "review",
        "condition": {"op": "gt", "field": "risk_score", "value": 7},
        "actions": [{"type": "set_flag", "flag": "high_risk"}],
        "auto_execute": true
    }],
    "layouts": [{
        "id": "agent-form",
        "sections": [
            {"id": "identity", "order": 1, "fields": ["name", "ssn"]},
            {"id": "risk", "order": 2, "fields": ["risk_score"]}
        ]
    }],
    "layout_bindings": [{"layout_id": "agent-form", "request_type": "agent", "workflow_stage": "*"}],
    "permission_rules": [
        {"entity": "*", "field": "*", "role": "*", "can_view": true},
        {"entity": "agent", "field": "ssn", "role": "*", "can_view": false},
        {"entity": "agent", "field": "risk_score", "role": "approver", "can_view": true, "can_edit": true}
    ],
    "roles": {"approver": ["approver@example.com"]}
}"#;

async fn app() -> Router {
    let engine = Catalog::from_json(CATALOG)
        .unwrap()
        .build(EngineConfig::default())
        .await
        .unwrap();
    create_router(AppState::new(Arc::new(engine)), false)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn transition(entity_id: &str, from: &str, to: &str) -> Value {
    json!({
        "entity_type": "agent",
        "entity_id": entity_id,
        "entity_data": {"name": "Acme", "risk_score": 3},
        "request_type": "agent",
        "current_stage": from,
        "target_stage": to
    })
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["workflows"], 1);
}

#[tokio::test]
async fn test_transition_advances_and_returns_view() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/transitions",
        Some(transition("a-1", "review", "approval")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["advanced"], true);
    assert_eq!(body["instance"]["current_stage"], "approval");

    let fields: Vec<&str> = body["view_structure"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "risk_score"]);

    let (status, instance) = send(&app, "GET", "/api/v1/instances/agent/a-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["status"], "in_progress");
    assert_eq!(instance["current_step"], 2);
}

#[tokio::test]
async fn test_replayed_transition_does_not_advance() {
    let app = app().await;
    let request = transition("a-2", "review", "approval");
    let (first, _) = send(&app, "POST", "/api/v1/transitions", Some(request.clone())).await;
    let (second, body) = send(&app, "POST", "/api/v1/transitions", Some(request)).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["advanced"], false);
}

#[tokio::test]
async fn test_fatal_errors_carry_codes() {
    let app = app().await;

    let mut unknown = transition("a-3", "review", "approval");
    unknown["request_type"] = json!("vendor");
    let (status, body) = send(&app, "POST", "/api/v1/transitions", Some(unknown)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_WORKFLOW");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/transitions",
        Some(transition("a-3", "approval", "review")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "ILLEGAL_TRANSITION");

    let (status, body) = send(&app, "GET", "/api/v1/instances/agent/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INSTANCE_NOT_FOUND");
}

#[tokio::test]
async fn test_blank_entity_id_is_rejected() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/transitions",
        Some(transition("  ", "review", "approval")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_view_structure_hides_fields() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/view-structure",
        Some(json!({
            "entity_name": "agent",
            "request_type": "agent",
            "workflow_stage": "approval",
            "viewer_role": "approver"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["layout_id"], "agent-form");
    let fields = body["fields"].as_array().unwrap();
    assert!(fields.iter().all(|f| f["name"] != "ssn"));
    let risk = fields.iter().find(|f| f["name"] == "risk_score").unwrap();
    assert_eq!(risk["can_edit"], true);
}

#[tokio::test]
async fn test_rule_evaluation_sets_flag() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/rules/evaluate",
        Some(json!({
            "entity_type": "agent",
            "entity_id": "a-4",
            "entity_data": {"risk_score": 9},
            "request_type": "agent",
            "workflow_stage": "review"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched_rules"], 1);
    assert_eq!(body["flags"]["high_risk"], true);
}

#[tokio::test]
async fn test_duplicate_active_default_conflicts() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/workflows",
        Some(json!({
            "id": "agent-v2",
            "request_type": "agent",
            "name": "Agent onboarding v2",
            "is_default": true,
            "status": "active",
            "workflow_steps": [
                {"step_number": 1, "step_type": "review", "is_first_step": true}
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_ACTIVE_DEFAULT");

    let (status, body) = send(&app, "GET", "/api/v1/workflows/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "WORKFLOW_NOT_FOUND");
}

#[tokio::test]
async fn test_cancel_then_re_review() {
    let app = app().await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/instances/start",
        Some(json!({"entity_type": "agent", "entity_id": "a-5", "request_type": "agent"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/instances/cancel",
        Some(json!({"entity_type": "agent", "entity_id": "a-5", "reason": "withdrawn"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    let first_id = body["id"].clone();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/instances/re-review",
        Some(json!({"entity_type": "agent", "entity_id": "a-5", "request_type": "agent"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous_instance"], first_id);

    let (status, history) =
        send(&app, "GET", "/api/v1/instances/agent/a-5/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_overdue_listing() {
    let app = app().await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/transitions",
        Some(transition("a-6", "review", "approval")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "GET",
        "/api/v1/instances/overdue?at=2999-01-01T00:00:00Z",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let overdue = body.as_array().unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0]["entity_id"], "a-6");
    assert_eq!(overdue[0]["stage"], "approval");
}

#[tokio::test]
async fn test_scope_selects_workflow() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/instances/start",
        Some(json!({"entity_type": "agent", "entity_id": "a-7", "request_type": "agent", "scope": "eu"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_WORKFLOW");

    let mut scoped = transition("a-7", "review", "approval");
    scoped["scope"] = json!("eu");
    let (status, body) = send(&app, "POST", "/api/v1/transitions", Some(scoped)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_WORKFLOW");
}
