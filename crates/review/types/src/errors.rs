//! Error types for the review workflow layer

use crate::WorkflowConfigId;

/// Errors that can occur in review workflow operations.
///
/// `InvalidWorkflow`, `IllegalTransition` and `PersistenceConflict` abort a
/// transition. The remaining per-item failures are normally recorded inside
/// results rather than returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReviewError {
    #[error("No active workflow for request type '{request_type}'")]
    InvalidWorkflow { request_type: String },

    #[error("Illegal transition {from} -> {to}: {reason}")]
    IllegalTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Rule '{rule_id}' failed: {reason}")]
    RuleEvaluationFailure { rule_id: String, reason: String },

    #[error("Notification to '{recipient}' failed: {reason}")]
    NotificationFailure { recipient: String, reason: String },

    #[error("Permission lookup failed for {entity}.{field} as '{role}': {reason}")]
    PermissionResolutionFailure {
        entity: String,
        field: String,
        role: String,
        reason: String,
    },

    #[error("Concurrent update lost for {entity_type}/{entity_id}")]
    PersistenceConflict {
        entity_type: String,
        entity_id: String,
    },

    #[error("Workflow config validation error: {0}")]
    ConfigValidation(String),

    #[error("Request type '{request_type}' (scope '{scope}') already has active default {existing}")]
    DuplicateActiveDefault {
        request_type: String,
        scope: String,
        existing: WorkflowConfigId,
    },

    #[error("Workflow config not found: {0}")]
    WorkflowNotFound(WorkflowConfigId),

    #[error("No approval instance for {entity_type}/{entity_id}")]
    InstanceNotFound {
        entity_type: String,
        entity_id: String,
    },

    #[error("{entity_type}/{entity_id} already has an open approval instance")]
    InstanceAlreadyOpen {
        entity_type: String,
        entity_id: String,
    },

    #[error("No layout for request type '{request_type}' at stage '{stage}'")]
    LayoutNotFound { request_type: String, stage: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ReviewError {
    /// Whether the error aborts a transition (as opposed to being recorded
    /// alongside a successful one).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::RuleEvaluationFailure { .. }
                | Self::NotificationFailure { .. }
                | Self::PermissionResolutionFailure { .. }
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidWorkflow { .. } => "INVALID_WORKFLOW",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::RuleEvaluationFailure { .. } => "RULE_EVALUATION_FAILURE",
            Self::NotificationFailure { .. } => "NOTIFICATION_FAILURE",
            Self::PermissionResolutionFailure { .. } => "PERMISSION_RESOLUTION_FAILURE",
            Self::PersistenceConflict { .. } => "PERSISTENCE_CONFLICT",
            Self::ConfigValidation(_) => "CONFIG_VALIDATION",
            Self::DuplicateActiveDefault { .. } => "DUPLICATE_ACTIVE_DEFAULT",
            Self::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            Self::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            Self::InstanceAlreadyOpen { .. } => "INSTANCE_ALREADY_OPEN",
            Self::LayoutNotFound { .. } => "LAYOUT_NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub fn illegal(from: impl Into<String>, to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IllegalTransition {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for review workflow operations
pub type ReviewResult<T> = Result<T, ReviewError>;
