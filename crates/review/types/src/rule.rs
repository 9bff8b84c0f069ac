//! Declarative business rules and their evaluation results

use crate::{Condition, RecipientSelector, ReviewError, ReviewResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stage or entity type value matching everything
pub const WILDCARD: &str = "*";

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a rule
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Rule ─────────────────────────────────────────────────────────────

/// A condition-to-action mapping evaluated at a workflow stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    #[serde(default)]
    pub name: String,
    pub entity_type: String,
    /// Exact stage name or `*`
    pub workflow_stage: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    /// Matched rules only run their actions when this is set
    #[serde(default)]
    pub auto_execute: bool,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        workflow_stage: impl Into<String>,
        condition: Condition,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: RuleId(id),
            entity_type: entity_type.into(),
            workflow_stage: workflow_stage.into(),
            condition,
            actions: Vec::new(),
            auto_execute: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn auto_execute(mut self) -> Self {
        self.auto_execute = true;
        self
    }

    pub fn applies_to(&self, entity_type: &str, stage: &str) -> bool {
        (self.entity_type == WILDCARD || self.entity_type == entity_type)
            && (self.workflow_stage == WILDCARD || self.workflow_stage == stage)
    }

    pub fn validate(&self) -> ReviewResult<()> {
        if self.id.0.trim().is_empty() {
            return Err(ReviewError::ConfigValidation("Rule id must not be empty".into()));
        }
        if self.entity_type.trim().is_empty() || self.workflow_stage.trim().is_empty() {
            return Err(ReviewError::ConfigValidation(format!(
                "Rule '{}' needs an entity_type and workflow_stage",
                self.id
            )));
        }
        for action in &self.actions {
            if let RuleAction::SetFlag { flag, .. } = action {
                if flag.trim().is_empty() {
                    return Err(ReviewError::ConfigValidation(format!(
                        "Rule '{}' sets a flag without a name",
                        self.id
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_flag_value() -> Value {
    Value::Bool(true)
}

/// Something a matched rule does
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    SendEmail {
        to: Vec<RecipientSelector>,
        template: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
    },
    SendQuestionnaire {
        questionnaire_id: String,
        to: RecipientSelector,
    },
    /// Forward selected entity fields to a downstream system
    PushData {
        target: String,
        #[serde(default)]
        fields: Vec<String>,
    },
    /// Ask a party for additional fields
    CollectData {
        from: RecipientSelector,
        fields: Vec<String>,
    },
    Webhook {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        include_data: bool,
    },
    /// Mark the entity; reported as `flag_<name>`
    SetFlag {
        flag: String,
        #[serde(default = "default_flag_value")]
        value: Value,
    },
}

impl RuleAction {
    pub fn set_flag(flag: impl Into<String>) -> Self {
        Self::SetFlag {
            flag: flag.into(),
            value: default_flag_value(),
        }
    }

    /// Name used in action results
    pub fn name(&self) -> String {
        match self {
            Self::SendEmail { .. } => "send_email".into(),
            Self::SendQuestionnaire { .. } => "send_questionnaire".into(),
            Self::PushData { .. } => "push_data".into(),
            Self::CollectData { .. } => "collect_data".into(),
            Self::Webhook { .. } => "webhook".into(),
            Self::SetFlag { flag, .. } => format!("flag_{}", flag),
        }
    }

    /// Whether running the action reaches outside the engine
    pub fn is_side_effecting(&self) -> bool {
        !matches!(self, Self::SetFlag { .. })
    }
}

// ── Evaluation results ───────────────────────────────────────────────

/// Outcome of evaluating the candidate rules for one stage
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluationResult {
    pub matched_rules: usize,
    pub rule_results: Vec<RuleResult>,
    pub action_results: Vec<ActionResult>,
    /// Flags raised by `set_flag` actions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, Value>,
}

impl RuleEvaluationResult {
    /// Ids of matched rules in evaluation order
    pub fn matched_rule_ids(&self) -> Vec<&RuleId> {
        self.rule_results
            .iter()
            .filter(|r| r.matched)
            .map(|r| &r.rule_id)
            .collect()
    }

    /// Rule and action failures as non-fatal errors
    pub fn failures(&self) -> Vec<ReviewError> {
        let rules = self.rule_results.iter().filter_map(|r| {
            r.error.as_ref().map(|e| ReviewError::RuleEvaluationFailure {
                rule_id: r.rule_id.to_string(),
                reason: e.clone(),
            })
        });
        let actions = self
            .action_results
            .iter()
            .filter(|a| matches!(a.status, ActionStatus::Failed | ActionStatus::TimedOut))
            .map(|a| ReviewError::RuleEvaluationFailure {
                rule_id: a.rule_id.to_string(),
                reason: format!(
                    "action {} ({}): {}",
                    a.action_index,
                    a.action,
                    a.error.as_deref().unwrap_or("timed out")
                ),
            });
        rules.chain(actions).collect()
    }
}

/// Per-rule match outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub matched: bool,
    pub executed: bool,
    /// Values of the fields the condition read
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a single action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    TimedOut,
    /// Same idempotency key already ran; not executed again
    Duplicate,
}

/// Per-action outcome, independent of sibling actions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub rule_id: RuleId,
    pub action_index: usize,
    pub action: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn succeeded(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_wildcard() {
        let rule = Rule::new("r1", "agent", WILDCARD, Condition::Always);
        assert!(rule.applies_to("agent", "review"));
        assert!(rule.applies_to("agent", "approval"));
        assert!(!rule.applies_to("vendor", "review"));

        let exact = Rule::new("r2", "agent", "review", Condition::Always);
        assert!(!exact.applies_to("agent", "approval"));
    }

    #[test]
    fn test_action_names() {
        assert_eq!(RuleAction::set_flag("high_risk").name(), "flag_high_risk");
        let webhook: RuleAction =
            serde_json::from_value(json!({"type": "webhook", "url": "http://x"})).unwrap();
        assert_eq!(webhook.name(), "webhook");
        assert!(webhook.is_side_effecting());
        assert!(!RuleAction::set_flag("x").is_side_effecting());
        if let RuleAction::Webhook { method, .. } = webhook {
            assert_eq!(method, "POST");
        }
    }

    #[test]
    fn test_rule_json() {
        let rule: Rule = serde_json::from_value(json!({
            "id": "high-risk",
            "entity_type": "agent",
            "workflow_stage": "review",
            "condition": {"op": "gt", "field": "risk_score", "value": 7},
            "actions": [{"type": "set_flag", "flag": "high_risk"}],
            "auto_execute": true
        }))
        .unwrap();
        assert!(rule.auto_execute);
        assert!(rule.validate().is_ok());
        assert_eq!(rule.actions[0], RuleAction::set_flag("high_risk"));
    }

    #[test]
    fn test_failures_collected() {
        let result = RuleEvaluationResult {
            matched_rules: 1,
            rule_results: vec![RuleResult {
                rule_id: RuleId::new("bad"),
                rule_name: "bad".into(),
                matched: false,
                executed: false,
                inputs: BTreeMap::new(),
                error: Some("type mismatch".into()),
            }],
            action_results: vec![ActionResult {
                rule_id: RuleId::new("ok"),
                action_index: 0,
                action: "webhook".into(),
                status: ActionStatus::TimedOut,
                idempotency_key: None,
                detail: None,
                error: None,
            }],
            flags: BTreeMap::new(),
        };
        let failures = result.failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| !f.is_fatal()));
    }
}
