//! Error types for tandemd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tandem_types::CoordinationError;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Coordinator set-up error
    #[error("Coordinator error: {0}")]
    Coordination(#[from] CoordinationError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Any error from the coordination services
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// HTTP status for a coordination error.
pub fn status_for(error: &CoordinationError) -> StatusCode {
    match error {
        CoordinationError::UnknownIdentity(_)
        | CoordinationError::UnknownTask(_)
        | CoordinationError::UnknownProtocol(_) => StatusCode::NOT_FOUND,
        CoordinationError::DuplicateIdentity(_)
        | CoordinationError::EntryExists(_)
        | CoordinationError::TaskAlreadyTerminal(_)
        | CoordinationError::ProtocolConflict(_) => StatusCode::CONFLICT,
        CoordinationError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CoordinationError::InvalidParticipants(_) | CoordinationError::InvalidStatus(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CoordinationError::InvalidEntryKey(_) | CoordinationError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        CoordinationError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        CoordinationError::LivenessTimeout(_) => StatusCode::GONE,
        CoordinationError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoordinationError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Coordination(error) = &self;
        let status = status_for(error);
        let body = ErrorResponse {
            error: error.to_string(),
            code: error.code().to_string(),
            details: Some(serde_json::Value::String(error.detail().to_string())),
        };

        if status.is_server_error() {
            tracing::error!(code = %body.code, error = %body.error, "Request failed");
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (
                CoordinationError::UnknownTask("t".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                CoordinationError::EntryExists("k".into()),
                StatusCode::CONFLICT,
            ),
            (
                CoordinationError::Unauthorized("x".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                CoordinationError::InvalidParticipants("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CoordinationError::Timeout("x".into()),
                StatusCode::REQUEST_TIMEOUT,
            ),
            (
                CoordinationError::LivenessTimeout("x".into()),
                StatusCode::GONE,
            ),
            (
                CoordinationError::Backend("disk".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), status);
        }
    }

    #[test]
    fn test_error_body_carries_wire_code() {
        let error = CoordinationError::EntryExists("transfer:1:file".into());
        let body = ErrorResponse {
            error: error.to_string(),
            code: error.code().to_string(),
            details: Some(serde_json::Value::String(error.detail().to_string())),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "ENTRY_EXISTS");
        assert_eq!(json["details"], "transfer:1:file");
    }
}
