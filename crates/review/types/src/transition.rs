//! Requests and results for the three engine operations

use crate::config::default_scope;
use crate::{
    ApprovalInstance, ApprovalInstanceId, Reminder, RecipientFailure, ResolvedRecipient, RuleEvaluationResult,
    ViewStructure,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const APPROVED_STAGE: &str = "approved";
pub const REJECTED_STAGE: &str = "rejected";
/// Stage carried by a cancelled instance; not a transition target
pub const CANCELLED_STAGE: &str = "cancelled";

/// Stages every workflow can end in
pub const TERMINAL_STAGES: [&str; 2] = [APPROVED_STAGE, REJECTED_STAGE];

pub fn is_terminal_stage(stage: &str) -> bool {
    TERMINAL_STAGES.contains(&stage)
}

/// Shallow-merge `overlay` onto `base`; overlay keys win.
///
/// Non-object inputs are treated as empty objects.
pub fn merge_data(base: &Value, overlay: Option<&Value>) -> Value {
    let mut merged: Map<String, Value> = base.as_object().cloned().unwrap_or_default();
    if let Some(Value::Object(extra)) = overlay {
        for (k, v) in extra {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}

// ── Transition ───────────────────────────────────────────────────────

/// Request to move an entity between stages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub entity_data: Value,
    pub request_type: String,
    /// Registry scope the active workflow is looked up in
    #[serde(default = "default_scope")]
    pub scope: String,
    pub current_stage: String,
    pub target_stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_data: Option<Value>,
    /// Role the resulting view is generated for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_category: Option<String>,
}

impl TransitionRequest {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        request_type: impl Into<String>,
        current_stage: impl Into<String>,
        target_stage: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            entity_data: Value::Object(Map::new()),
            request_type: request_type.into(),
            scope: default_scope(),
            current_stage: current_stage.into(),
            target_stage: target_stage.into(),
            transition_data: None,
            acting_role: None,
            agent_type: None,
            agent_category: None,
        }
    }

    pub fn with_entity_data(mut self, data: Value) -> Self {
        self.entity_data = data;
        self
    }

    pub fn with_transition_data(mut self, data: Value) -> Self {
        self.transition_data = Some(data);
        self
    }

    pub fn with_acting_role(mut self, role: impl Into<String>) -> Self {
        self.acting_role = Some(role.into());
        self
    }

    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Entity data with transition data layered on top
    pub fn merged_data(&self) -> Value {
        merge_data(&self.entity_data, self.transition_data.as_ref())
    }

    /// `transition_data.decision` is `reject` or `rejected`
    pub fn is_explicit_rejection(&self) -> bool {
        self.transition_data
            .as_ref()
            .and_then(|d| d.get("decision"))
            .and_then(Value::as_str)
            .map(|d| {
                let d = d.trim().to_ascii_lowercase();
                d == "reject" || d == "rejected"
            })
            .unwrap_or(false)
    }

    pub fn notes(&self) -> Option<String> {
        self.transition_data
            .as_ref()
            .and_then(|d| d.get("notes"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Aggregate outcome of a transition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionResult {
    pub success: bool,
    /// False for an idempotent replay
    pub advanced: bool,
    pub current_stage: String,
    pub target_stage: String,
    pub instance: ApprovalInstance,
    pub rule_results: RuleEvaluationResult,
    pub notifications: Vec<ResolvedRecipient>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notification_failures: Vec<RecipientFailure>,
    pub reminders: Vec<Reminder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_structure: Option<ViewStructure>,
    /// Non-fatal problems encountered after the commit
    #[serde(default)]
    pub warnings: Vec<String>,
}

// ── View and rule requests ───────────────────────────────────────────

/// Request for a role- and stage-filtered view
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRequest {
    pub entity_name: String,
    pub request_type: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    pub workflow_stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_category: Option<String>,
    /// Defaults to the stage's assigned role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_role: Option<String>,
}

impl ViewRequest {
    pub fn new(
        entity_name: impl Into<String>,
        request_type: impl Into<String>,
        workflow_stage: impl Into<String>,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            request_type: request_type.into(),
            scope: default_scope(),
            workflow_stage: workflow_stage.into(),
            entity_id: None,
            agent_type: None,
            agent_category: None,
            viewer_role: None,
        }
    }

    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.viewer_role = Some(role.into());
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    /// Resolve the step from this entity's instance when it sits at the stage
    pub fn for_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

fn default_true() -> bool {
    true
}

/// Request to evaluate rules at a stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluationRequest {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub entity_data: Value,
    pub request_type: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    pub workflow_stage: String,
    #[serde(default = "default_true")]
    pub auto_execute: bool,
    /// Instance the evaluation runs for; part of the idempotency key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<ApprovalInstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    /// Approver assigned to the stage, for `next_approver` selectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_approver: Option<String>,
}

impl RuleEvaluationRequest {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        entity_data: Value,
        request_type: impl Into<String>,
        workflow_stage: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            entity_data,
            request_type: request_type.into(),
            scope: default_scope(),
            workflow_stage: workflow_stage.into(),
            auto_execute: true,
            instance_id: None,
            step_number: None,
            next_approver: None,
        }
    }

    pub fn advisory(mut self) -> Self {
        self.auto_execute = false;
        self
    }

    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Tie the evaluation to an instance's step
    pub fn for_instance(mut self, instance_id: ApprovalInstanceId, step_number: Option<u32>) -> Self {
        self.instance_id = Some(instance_id);
        self.step_number = step_number;
        self
    }

    pub fn with_next_approver(mut self, approver: Option<&str>) -> Self {
        self.next_approver = approver.map(str::to_string);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transition_data_wins() {
        let req = TransitionRequest::new("agent", "a-1", "agent", "review", "approval")
            .with_entity_data(json!({"risk_score": 3, "name": "Acme"}))
            .with_transition_data(json!({"risk_score": 9}));
        assert_eq!(req.merged_data(), json!({"risk_score": 9, "name": "Acme"}));
    }

    #[test]
    fn test_explicit_rejection() {
        let base = TransitionRequest::new("agent", "a-1", "agent", "approval", "rejected");
        assert!(!base.is_explicit_rejection());
        let rejecting = base.clone().with_transition_data(json!({"decision": "Rejected"}));
        assert!(rejecting.is_explicit_rejection());
    }

    #[test]
    fn test_rule_request_defaults_to_auto_execute() {
        let req: RuleEvaluationRequest = serde_json::from_value(json!({
            "entity_type": "agent",
            "entity_id": "a-1",
            "request_type": "agent",
            "workflow_stage": "review"
        }))
        .unwrap();
        assert!(req.auto_execute);
        assert!(req.entity_data.is_null());
        assert_eq!(req.scope, crate::DEFAULT_SCOPE);
        assert!(req.instance_id.is_none());
    }

    #[test]
    fn test_scope_defaults_and_overrides() {
        let view: ViewRequest = serde_json::from_value(json!({
            "entity_name": "agent",
            "request_type": "agent",
            "workflow_stage": "review"
        }))
        .unwrap();
        assert_eq!(view.scope, crate::DEFAULT_SCOPE);

        let transition: TransitionRequest = serde_json::from_value(json!({
            "entity_type": "agent",
            "entity_id": "a-1",
            "request_type": "agent",
            "scope": "eu",
            "current_stage": "review",
            "target_stage": "approval"
        }))
        .unwrap();
        assert_eq!(transition.scope, "eu");
    }
}
