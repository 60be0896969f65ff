//! Error types for datamap-server
//!
//! Route handlers convert engine errors into HTTP responses with a stable
//! error-kind code. Raw source errors (driver messages, remote bodies) are
//! logged via tracing and never leave the process.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., load run already in flight
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No active source connection is configured (409)
    #[error("No active source connection")]
    NoActiveSource,

    /// No active site configuration (409)
    #[error("No active site configuration")]
    NoActiveSite,

    /// Mapping set cannot produce a query (422)
    #[error("Mapping incomplete: {0}")]
    MappingIncomplete(String),

    /// The live source connection could not be reached (502)
    #[error("Source system unreachable")]
    SourceUnreachable,

    /// Downstream staging aggregator rejected or dropped a batch (502)
    #[error("Transmission failed: {0}")]
    SendFailed(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// datamap-common error
    #[error(transparent)]
    Common(#[from] datamap_common::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::NoActiveSource => (StatusCode::CONFLICT, "NO_ACTIVE_SOURCE"),
            ApiError::NoActiveSite => (StatusCode::CONFLICT, "NO_ACTIVE_SITE"),
            ApiError::MappingIncomplete(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "MAPPING_INCOMPLETE")
            }
            ApiError::SourceUnreachable => (StatusCode::BAD_GATEWAY, "SOURCE_UNREACHABLE"),
            ApiError::SendFailed(_) => (StatusCode::BAD_GATEWAY, "SEND_FAILED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(datamap_common::Error::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ApiError::Common(datamap_common::Error::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Externally visible message; internal variants are sanitized
    fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) | ApiError::Other(_) => "Internal server error".to_string(),
            ApiError::Common(err) => match err {
                datamap_common::Error::NotFound(_) | datamap_common::Error::InvalidInput(_) => {
                    err.to_string()
                }
                _ => "Internal server error".to_string(),
            },
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code = code, error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.public_message(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_error_codes() {
        assert_eq!(ApiError::NoActiveSource.status_and_code().1, "NO_ACTIVE_SOURCE");
        assert_eq!(ApiError::NoActiveSite.status_and_code().1, "NO_ACTIVE_SITE");
        assert_eq!(
            ApiError::MappingIncomplete("x".into()).status_and_code().0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::SourceUnreachable.status_and_code().0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_detail_is_sanitized() {
        let err = ApiError::Internal("password=hunter2 connection refused".to_string());
        assert_eq!(err.public_message(), "Internal server error");

        let err = ApiError::Common(datamap_common::Error::Internal("driver detail".into()));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = ApiError::NotFound("dictionary 'lab'".to_string());
        assert!(err.public_message().contains("lab"));
    }
}
