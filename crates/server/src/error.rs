// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use co11y_core::{HookValidationError, ParseError};
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("Invalid hook event: {0}")]
    InvalidHookEvent(#[from] HookValidationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::SessionNotFound(id) => {
                tracing::debug!(session_id = %id, "Session not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Session not found", format!("Session ID: {}", id)),
                )
            }
            ApiError::ProjectNotFound(id) => {
                tracing::debug!(project_id = %id, "Project not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Project not found", format!("Project ID: {}", id)),
                )
            }
            ApiError::Parse(parse_err) => {
                let (status, error_msg) = match parse_err {
                    ParseError::NotFound { path } => {
                        tracing::debug!(path = %path.display(), "File not found");
                        (StatusCode::NOT_FOUND, "File not found")
                    }
                    ParseError::PermissionDenied { path } => {
                        tracing::error!(path = %path.display(), "Permission denied");
                        (StatusCode::FORBIDDEN, "Permission denied")
                    }
                    ParseError::Io { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "IO error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "IO error reading file")
                    }
                };
                (
                    status,
                    ErrorResponse::with_details(error_msg, parse_err.to_string()),
                )
            }
            ApiError::InvalidJson(msg) => {
                tracing::warn!(message = %msg, "Rejected hook payload with invalid JSON");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid JSON payload", msg.clone()),
                )
            }
            ApiError::InvalidHookEvent(reason) => {
                tracing::warn!(reason = %reason, "Rejected malformed hook event");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid hook event structure", reason.to_string()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
