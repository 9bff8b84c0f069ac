//! Approval instances: one entity's traversal of one workflow config
//!
//! The step ledger is append-only. A step is recorded when it is entered or
//! skipped and is never rewound; re-review creates a new instance that points
//! back at the previous one.

use crate::{WorkflowConfig, WorkflowConfigId, APPROVED_STAGE, CANCELLED_STAGE, REJECTED_STAGE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Instance Identifier ──────────────────────────────────────────────

/// Unique identifier for an approval instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalInstanceId(pub String);

impl ApprovalInstanceId {
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

impl std::fmt::Display for ApprovalInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Approval Instance ────────────────────────────────────────────────

/// Run-time record of an entity moving through a workflow config
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalInstance {
    pub id: ApprovalInstanceId,
    pub config_id: WorkflowConfigId,
    pub request_type: String,
    pub entity_type: String,
    pub entity_id: String,
    /// Always a step number present in the config
    pub current_step: u32,
    /// Stage the entity currently carries (a step stage or a terminal)
    pub current_stage: String,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<ApprovalStep>,
    /// Instance this one re-reviews
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_instance: Option<ApprovalInstanceId>,
    /// Bumped by the store on every commit
    pub version: u64,
    pub history: Vec<TransitionRecord>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalInstance {
    /// Create a pending instance positioned at the config's first step
    pub fn new(
        config: &WorkflowConfig,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Option<Self> {
        let first = config.first_step()?;
        let now = Utc::now();
        Some(Self {
            id: ApprovalInstanceId::generate(),
            config_id: config.id.clone(),
            request_type: config.request_type.clone(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            current_step: first.step_number,
            current_stage: first.stage_name(),
            status: InstanceStatus::Pending,
            started_at: now,
            completed_at: None,
            steps: Vec::new(),
            previous_instance: None,
            version: 0,
            history: Vec::new(),
            updated_at: now,
        })
    }

    pub fn with_previous(mut self, previous: ApprovalInstanceId) -> Self {
        self.previous_instance = Some(previous);
        self
    }

    /// Open the first step
    pub fn start(&mut self, assigned_to: Option<String>) {
        let step = self.current_step;
        let stage = self.current_stage.clone();
        self.status = InstanceStatus::InProgress;
        self.open_step(step, stage, assigned_to);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn step_record(&self, step_number: u32) -> Option<&ApprovalStep> {
        self.steps.iter().rev().find(|s| s.step_number == step_number)
    }

    /// The in-progress step, if any
    pub fn active_step(&self) -> Option<&ApprovalStep> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.status == StepStatus::InProgress)
    }

    pub fn last_transition(&self) -> Option<&TransitionRecord> {
        self.history.last()
    }

    /// Whether `from -> to` was the last transition and nothing moved since
    pub fn is_replay_of(&self, from_stage: &str, to_stage: &str) -> bool {
        self.current_stage == to_stage
            && self
                .last_transition()
                .map(|t| t.from_stage == from_stage && t.to_stage == to_stage)
                .unwrap_or(false)
    }

    /// Complete the in-progress step
    pub fn complete_current_step(&mut self, notes: Option<String>) {
        let now = Utc::now();
        let current = self.current_step;
        if let Some(step) = self
            .steps
            .iter_mut()
            .rev()
            .find(|s| s.step_number == current && s.status == StepStatus::InProgress)
        {
            step.status = StepStatus::Completed;
            step.completed_at = Some(now);
            if notes.is_some() {
                step.notes = notes;
            }
        }
        self.updated_at = now;
    }

    /// Record a step as passed over without being worked
    pub fn skip_step(&mut self, step_number: u32, stage: impl Into<String>) {
        let now = Utc::now();
        self.steps.push(ApprovalStep {
            step_number,
            stage: stage.into(),
            status: StepStatus::Skipped,
            assigned_to: None,
            started_at: None,
            completed_at: Some(now),
            notes: None,
        });
        self.updated_at = now;
    }

    /// Move to a step and open its ledger record
    pub fn enter_step(
        &mut self,
        step_number: u32,
        stage: impl Into<String>,
        assigned_to: Option<String>,
    ) {
        let stage = stage.into();
        self.current_step = step_number;
        self.current_stage = stage.clone();
        self.status = InstanceStatus::InProgress;
        self.open_step(step_number, stage, assigned_to);
    }

    /// Close the instance as approved or rejected
    pub fn finish(&mut self, outcome: InstanceStatus) {
        let now = Utc::now();
        self.status = outcome;
        self.current_stage = outcome.terminal_stage().unwrap_or(APPROVED_STAGE).to_string();
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn cancel(&mut self, reason: Option<String>) {
        let now = Utc::now();
        let current = self.current_step;
        if let Some(step) = self
            .steps
            .iter_mut()
            .rev()
            .find(|s| s.step_number == current && s.status == StepStatus::InProgress)
        {
            step.status = StepStatus::Skipped;
            step.completed_at = Some(now);
            step.notes = reason.clone();
        }
        let from = std::mem::replace(&mut self.current_stage, CANCELLED_STAGE.to_string());
        self.status = InstanceStatus::Cancelled;
        self.completed_at = Some(now);
        self.updated_at = now;
        self.history.push(TransitionRecord {
            from_stage: from,
            to_stage: CANCELLED_STAGE.to_string(),
            from_step: current,
            to_step: None,
            acting_role: None,
            notes: reason,
            at: now,
        });
    }

    pub fn record_transition(&mut self, record: TransitionRecord) {
        self.updated_at = record.at;
        self.history.push(record);
    }

    /// When the active step is due, given its SLA in days
    pub fn active_step_due(&self, due_in_days: u32) -> Option<DateTime<Utc>> {
        self.active_step()
            .and_then(|s| s.started_at)
            .and_then(|started| {
                chrono::Duration::try_days(i64::from(due_in_days))
                    .and_then(|delta| started.checked_add_signed(delta))
            })
    }

    fn open_step(&mut self, step_number: u32, stage: String, assigned_to: Option<String>) {
        let now = Utc::now();
        self.steps.push(ApprovalStep {
            step_number,
            stage,
            status: StepStatus::InProgress,
            assigned_to,
            started_at: Some(now),
            completed_at: None,
            notes: None,
        });
        self.updated_at = now;
    }
}

/// Instance lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    pub fn terminal_stage(&self) -> Option<&'static str> {
        match self {
            Self::Approved => Some(APPROVED_STAGE),
            Self::Rejected => Some(REJECTED_STAGE),
            Self::Cancelled => Some(CANCELLED_STAGE),
            Self::Pending | Self::InProgress => None,
        }
    }
}

// ── Step ledger ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

/// Execution record for one step of an instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub step_number: u32,
    pub stage: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One committed stage change
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from_stage: String,
    pub to_stage: String,
    pub from_step: u32,
    /// `None` when the instance reached a terminal
    pub to_step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acting_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}
