//! Error types for reviewd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use review_types::ReviewError;
use serde::Serialize;
use thiserror::Error;

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bootstrap catalog could not be loaded
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Engine rejected bootstrap data
    #[error("Engine error: {0}")]
    Engine(#[from] ReviewError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Engine error, mapped by kind
    #[error(transparent)]
    Review(#[from] ReviewError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Review(err) => match err {
                ReviewError::WorkflowNotFound(_)
                | ReviewError::InstanceNotFound { .. }
                | ReviewError::LayoutNotFound { .. } => StatusCode::NOT_FOUND,
                ReviewError::PersistenceConflict { .. }
                | ReviewError::InstanceAlreadyOpen { .. }
                | ReviewError::DuplicateActiveDefault { .. } => StatusCode::CONFLICT,
                ReviewError::InvalidWorkflow { .. }
                | ReviewError::IllegalTransition { .. }
                | ReviewError::ConfigValidation(_)
                | ReviewError::RuleEvaluationFailure { .. }
                | ReviewError::NotificationFailure { .. }
                | ReviewError::PermissionResolutionFailure { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ReviewError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Review(err) => err.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
