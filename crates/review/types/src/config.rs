//! Workflow configurations: the stage blueprint for a request type
//!
//! A WorkflowConfig is an ordered list of steps. Each step names a stage an
//! entity can occupy, who works it, whether it may be skipped and how its
//! form and notifications behave. Configs are validated once, when they are
//! registered, and are treated as immutable afterwards.

use crate::{Condition, RecipientSelector, ReviewError, ReviewResult, Rule, TERMINAL_STAGES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow config
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowConfigId(pub String);

impl WorkflowConfigId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for WorkflowConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scope used when a config does not name one
pub const DEFAULT_SCOPE: &str = "default";

/// Upper bound for SLAs and reminder offsets, in days
pub const MAX_SLA_DAYS: u32 = 3650;

pub(crate) fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_true() -> bool {
    true
}

// ── Workflow Config ──────────────────────────────────────────────────

/// Lifecycle of a config inside the registry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    #[default]
    Draft,
    Active,
    Inactive,
}

/// A configurable multi-stage review process for one request type
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "WorkflowConfigId::generate")]
    pub id: WorkflowConfigId,
    /// Request type this config governs (e.g. "agent", "vendor")
    pub request_type: String,
    /// Grouping within a request type; one active default per scope
    #[serde(default = "default_scope")]
    pub scope: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered steps; ordering is by `step_number`, not array position
    pub workflow_steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub assignment_rules: Vec<AssignmentRule>,
    /// Entry guards per step
    #[serde(default)]
    pub conditions: Vec<StageCondition>,
    /// Rules evaluated after the engine-wide rule set
    #[serde(default)]
    pub trigger_rules: Vec<Rule>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub status: ConfigStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl WorkflowConfig {
    pub fn new(request_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: WorkflowConfigId::generate(),
            request_type: request_type.into(),
            scope: default_scope(),
            name: name.into(),
            description: String::new(),
            workflow_steps: Vec::new(),
            assignment_rules: Vec::new(),
            conditions: Vec::new(),
            trigger_rules: Vec::new(),
            is_default: false,
            status: ConfigStatus::Draft,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: WorkflowConfigId) -> Self {
        self.id = id;
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.workflow_steps.push(step);
        self
    }

    pub fn with_assignment_rule(mut self, rule: AssignmentRule) -> Self {
        self.assignment_rules.push(rule);
        self
    }

    pub fn with_condition(mut self, condition: StageCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_trigger_rule(mut self, rule: Rule) -> Self {
        self.trigger_rules.push(rule);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_status(mut self, status: ConfigStatus) -> Self {
        self.status = status;
        self
    }

    /// Validate structural invariants.
    ///
    /// Step numbers must be unique, exactly one step is the first step and
    /// it carries the lowest step number, stage names may not shadow the
    /// terminal stages, and every guard or assignment rule must point at a
    /// step that exists.
    pub fn validate(&self) -> ReviewResult<()> {
        if self.request_type.trim().is_empty() {
            return Err(ReviewError::ConfigValidation(
                "request_type must not be empty".into(),
            ));
        }
        if self.workflow_steps.is_empty() {
            return Err(ReviewError::ConfigValidation(format!(
                "Workflow '{}' has no steps",
                self.name
            )));
        }

        let mut numbers = HashSet::new();
        for step in &self.workflow_steps {
            if !numbers.insert(step.step_number) {
                return Err(ReviewError::ConfigValidation(format!(
                    "Duplicate step_number {}",
                    step.step_number
                )));
            }
            let stage = step.stage_name();
            if TERMINAL_STAGES.contains(&stage.as_str()) {
                return Err(ReviewError::ConfigValidation(format!(
                    "Step {} uses reserved stage name '{}'",
                    step.step_number, stage
                )));
            }
            if let Some(days) = step.due_in_days.filter(|d| *d > MAX_SLA_DAYS) {
                return Err(ReviewError::ConfigValidation(format!(
                    "Step {} has due_in_days {} above the {} day limit",
                    step.step_number, days, MAX_SLA_DAYS
                )));
            }
            if let Some(settings) = &step.stage_settings {
                if let Some(notifications) = &settings.email_notifications {
                    if let Some(offset) = notifications
                        .reminders
                        .iter()
                        .find(|d| **d < 0 || **d > i64::from(MAX_SLA_DAYS))
                    {
                        return Err(ReviewError::ConfigValidation(format!(
                            "Step {} has reminder offset {} outside 0..={}",
                            step.step_number, offset, MAX_SLA_DAYS
                        )));
                    }
                }
            }
        }

        let first_steps: Vec<_> = self
            .workflow_steps
            .iter()
            .filter(|s| s.is_first_step)
            .collect();
        match first_steps.as_slice() {
            [first] => {
                let lowest = self
                    .workflow_steps
                    .iter()
                    .map(|s| s.step_number)
                    .min()
                    .unwrap_or(first.step_number);
                if first.step_number != lowest {
                    return Err(ReviewError::ConfigValidation(format!(
                        "First step {} is not the lowest step number ({})",
                        first.step_number, lowest
                    )));
                }
            }
            [] => {
                return Err(ReviewError::ConfigValidation(
                    "No step is marked is_first_step".into(),
                ))
            }
            many => {
                return Err(ReviewError::ConfigValidation(format!(
                    "{} steps are marked is_first_step; exactly one is allowed",
                    many.len()
                )))
            }
        }

        for guard in &self.conditions {
            if !numbers.contains(&guard.step_number) {
                return Err(ReviewError::ConfigValidation(format!(
                    "Condition references unknown step {}",
                    guard.step_number
                )));
            }
        }
        for rule in &self.assignment_rules {
            if let Some(n) = rule.step_number {
                if !numbers.contains(&n) {
                    return Err(ReviewError::ConfigValidation(format!(
                        "Assignment rule references unknown step {}",
                        n
                    )));
                }
            }
        }
        for rule in &self.trigger_rules {
            rule.validate()?;
        }

        Ok(())
    }

    /// Steps sorted by step number
    pub fn ordered_steps(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<_> = self.workflow_steps.iter().collect();
        steps.sort_by_key(|s| s.step_number);
        steps
    }

    pub fn first_step(&self) -> Option<&WorkflowStep> {
        self.workflow_steps.iter().find(|s| s.is_first_step)
    }

    pub fn step(&self, step_number: u32) -> Option<&WorkflowStep> {
        self.workflow_steps
            .iter()
            .find(|s| s.step_number == step_number)
    }

    /// Steps strictly after `step_number`, in order
    pub fn steps_after(&self, step_number: u32) -> Vec<&WorkflowStep> {
        self.ordered_steps()
            .into_iter()
            .filter(|s| s.step_number > step_number)
            .collect()
    }

    pub fn next_step(&self, step_number: u32) -> Option<&WorkflowStep> {
        self.steps_after(step_number).into_iter().next()
    }

    pub fn is_last_step(&self, step_number: u32) -> bool {
        self.next_step(step_number).is_none()
    }

    /// The first step whose stage name is `stage`
    pub fn step_for_stage(&self, stage: &str) -> Option<&WorkflowStep> {
        self.ordered_steps()
            .into_iter()
            .find(|s| s.stage_name() == stage)
    }

    /// Distinct stage names in step order, followed by the terminals
    pub fn stages(&self) -> Vec<String> {
        let mut stages: Vec<String> = Vec::new();
        for step in self.ordered_steps() {
            let name = step.stage_name();
            if !stages.contains(&name) {
                stages.push(name);
            }
        }
        stages.extend(TERMINAL_STAGES.iter().map(|s| s.to_string()));
        stages
    }

    /// Entry guards for a step
    pub fn guards_for(&self, step_number: u32) -> impl Iterator<Item = &StageCondition> {
        self.conditions
            .iter()
            .filter(move |c| c.step_number == step_number)
    }

    pub fn is_active_default(&self) -> bool {
        self.is_default && self.status == ConfigStatus::Active
    }
}

// ── Workflow Step ────────────────────────────────────────────────────

/// Kind of work performed at a step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Review,
    Approval,
    Notification,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Approval => "approval",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a workflow config
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_number: u32,
    pub step_type: StepType,
    /// Stage name; falls back to the step type when empty
    #[serde(default)]
    pub step_name: String,
    #[serde(default)]
    pub assigned_role: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub can_skip: bool,
    #[serde(default)]
    pub auto_assign: bool,
    /// Candidate assignees rotated through when `auto_assign` is set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignee_pool: Vec<String>,
    #[serde(default)]
    pub is_first_step: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_settings: Option<StageSettings>,
    /// SLA for the step, used for due dates and overdue detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_in_days: Option<u32>,
}

impl WorkflowStep {
    pub fn new(step_number: u32, step_type: StepType) -> Self {
        Self {
            step_number,
            step_type,
            step_name: String::new(),
            assigned_role: String::new(),
            required: true,
            can_skip: false,
            auto_assign: false,
            assignee_pool: Vec::new(),
            is_first_step: false,
            stage_settings: None,
            due_in_days: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.step_name = name.into();
        self
    }

    pub fn first(mut self) -> Self {
        self.is_first_step = true;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.assigned_role = role.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn skippable(mut self) -> Self {
        self.can_skip = true;
        self
    }

    pub fn with_auto_assign(mut self, pool: Vec<String>) -> Self {
        self.auto_assign = true;
        self.assignee_pool = pool;
        self
    }

    pub fn with_settings(mut self, settings: StageSettings) -> Self {
        self.stage_settings = Some(settings);
        self
    }

    pub fn with_due_in_days(mut self, days: u32) -> Self {
        self.due_in_days = Some(days);
        self
    }

    /// The stage name an entity carries while at this step
    pub fn stage_name(&self) -> String {
        let name = self.step_name.trim();
        if name.is_empty() {
            self.step_type.as_str().to_string()
        } else {
            name.to_string()
        }
    }

    pub fn notifications(&self) -> Option<&EmailNotifications> {
        self.stage_settings
            .as_ref()
            .and_then(|s| s.email_notifications.as_ref())
    }
}

/// Per-stage form and notification settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    /// Allow-list of fields; empty means no restriction
    #[serde(default)]
    pub visible_fields: Vec<String>,
    /// Layout that overrides the catalog binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notifications: Option<EmailNotifications>,
}

impl StageSettings {
    pub fn with_visible_fields(mut self, fields: Vec<String>) -> Self {
        self.visible_fields = fields;
        self
    }

    pub fn with_layout(mut self, layout_id: impl Into<String>) -> Self {
        self.layout_id = Some(layout_id.into());
        self
    }

    pub fn with_notifications(mut self, notifications: EmailNotifications) -> Self {
        self.email_notifications = Some(notifications);
        self
    }
}

/// Who is told about a stage and when they are reminded
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailNotifications {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub recipients: Vec<RecipientSelector>,
    /// Reminder offsets in days before the due date
    #[serde(default)]
    pub reminders: Vec<i64>,
}

// ── Guards and assignment ────────────────────────────────────────────

/// Chooses an assignee for a step when its condition holds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRule {
    /// Step this rule applies to; `None` applies to every step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    #[serde(default)]
    pub condition: Condition,
    pub assign_to: String,
}

/// Entry guard for a step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageCondition {
    pub step_number: u32,
    pub condition: Condition,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_step() -> WorkflowConfig {
        WorkflowConfig::new("agent", "Agent onboarding")
            .with_step(WorkflowStep::new(1, StepType::Review).first())
            .with_step(WorkflowStep::new(2, StepType::Approval))
    }

    #[test]
    fn test_valid_config() {
        let config = two_step();
        assert!(config.validate().is_ok());
        assert_eq!(config.first_step().map(|s| s.step_number), Some(1));
        assert_eq!(
            config.stages(),
            vec!["review", "approval", "approved", "rejected"]
        );
    }

    #[test]
    fn test_duplicate_step_numbers_rejected() {
        let config = two_step().with_step(WorkflowStep::new(2, StepType::Notification));
        assert!(matches!(
            config.validate(),
            Err(ReviewError::ConfigValidation(msg)) if msg.contains("Duplicate")
        ));
    }

    #[test]
    fn test_first_step_count_enforced() {
        let none = WorkflowConfig::new("agent", "none")
            .with_step(WorkflowStep::new(1, StepType::Review));
        assert!(none.validate().is_err());

        let two = two_step().with_step(WorkflowStep::new(3, StepType::Review).first());
        assert!(two.validate().is_err());
    }

    #[test]
    fn test_first_step_must_be_lowest() {
        let config = WorkflowConfig::new("agent", "backwards")
            .with_step(WorkflowStep::new(1, StepType::Review))
            .with_step(WorkflowStep::new(2, StepType::Approval).first());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reserved_stage_names_rejected() {
        let config = two_step().with_step(WorkflowStep::new(3, StepType::Review).named("approved"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sla_and_reminder_bounds() {
        let long_sla = two_step().with_step(
            WorkflowStep::new(3, StepType::Approval).with_due_in_days(MAX_SLA_DAYS + 1),
        );
        assert!(long_sla.validate().is_err());

        let far_reminder = two_step().with_step(WorkflowStep::new(3, StepType::Approval).with_settings(
            StageSettings::default().with_notifications(EmailNotifications {
                enabled: true,
                recipients: Vec::new(),
                reminders: vec![1, 200_000_000],
            }),
        ));
        assert!(matches!(
            far_reminder.validate(),
            Err(ReviewError::ConfigValidation(msg)) if msg.contains("200000000")
        ));

        let at_limit = two_step()
            .with_step(WorkflowStep::new(3, StepType::Approval).with_due_in_days(MAX_SLA_DAYS));
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_guard_must_reference_step() {
        let config = two_step().with_condition(StageCondition {
            step_number: 9,
            condition: Condition::Always,
            description: String::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_steps_ordered_by_number() {
        let config = WorkflowConfig::new("vendor", "out of order")
            .with_step(WorkflowStep::new(30, StepType::Approval))
            .with_step(WorkflowStep::new(10, StepType::Review).first())
            .with_step(WorkflowStep::new(20, StepType::Review).named("compliance"));
        assert!(config.validate().is_ok());
        assert_eq!(config.next_step(10).map(|s| s.step_number), Some(20));
        assert!(config.is_last_step(30));
        assert_eq!(
            config.step_for_stage("compliance").map(|s| s.step_number),
            Some(20)
        );
    }

    #[test]
    fn test_step_json_defaults() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "step_number": 2,
            "step_type": "approval",
            "assigned_role": "compliance_officer"
        }))
        .unwrap();
        assert!(step.required);
        assert!(!step.can_skip);
        assert!(step.stage_settings.is_none());
        assert_eq!(step.stage_name(), "approval");
    }

    #[test]
    fn test_config_json_defaults() {
        let config: WorkflowConfig = serde_json::from_value(json!({
            "id": "wf-agent",
            "request_type": "agent",
            "name": "Agent",
            "workflow_steps": [
                {"step_number": 1, "step_type": "review", "is_first_step": true}
            ]
        }))
        .unwrap();
        assert_eq!(config.scope, DEFAULT_SCOPE);
        assert_eq!(config.status, ConfigStatus::Draft);
        assert!(!config.is_active_default());
    }
}
