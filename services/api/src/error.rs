//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered to HTTP clients. Every failure body is `{"message": "..."}`; internal
//! details are logged, never returned.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use study_assistant_core::{pipeline::UploadError, ports::PortError};
use tracing::error;
use utoipa::ToSchema;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request carries no usable identity.
    #[error("{0}")]
    Unauthorized(String),

    /// A bearer token was presented but failed verification.
    #[error("Invalid token")]
    InvalidCredential,

    /// The resource is absent or owned by someone else.
    #[error("{0}")]
    NotFound(String),

    /// A required field is missing or a uniqueness rule was violated.
    #[error("{0}")]
    Validation(String),

    /// A failure inside the upload pipeline.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn session_not_found() -> Self {
        ApiError::NotFound("Study session not found".to_string())
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.clone()),
            ApiError::InvalidCredential => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::Port(PortError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }
            ApiError::Port(PortError::Conflict(message)) => {
                (StatusCode::BAD_REQUEST, message.clone())
            }
            ApiError::Port(PortError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "Access denied".to_string())
            }
            ApiError::Upload(upload) => match upload {
                UploadError::NoFile
                | UploadError::TooLarge { .. }
                | UploadError::UnsupportedFormat(_)
                | UploadError::EmptyDocument => (StatusCode::BAD_REQUEST, upload.to_string()),
                UploadError::SessionNotFound => (StatusCode::NOT_FOUND, upload.to_string()),
                UploadError::ExtractionFailure(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error reading file".to_string(),
                ),
                UploadError::Storage(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error processing file".to_string(),
                ),
            },
            ApiError::Port(PortError::Unexpected(_))
            | ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(ErrorResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_errors_map_to_the_documented_status_codes() {
        let cases = [
            (ApiError::from(UploadError::NoFile), StatusCode::BAD_REQUEST),
            (
                ApiError::from(UploadError::TooLarge { limit: 5 * 1024 * 1024 }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(UploadError::UnsupportedFormat("no".into())),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::from(UploadError::SessionNotFound), StatusCode::NOT_FOUND),
            (
                ApiError::from(UploadError::ExtractionFailure("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status_and_message().0, expected, "{error:?}");
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let (status, message) =
            ApiError::Port(PortError::Unexpected("connection refused at 10.0.0.3".into()))
                .status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("10.0.0.3"));

        let (_, message) =
            ApiError::from(UploadError::ExtractionFailure("xref table broken".into()))
                .status_and_message();
        assert_eq!(message, "Error reading file");

        let (status, message) =
            ApiError::from(UploadError::Storage(PortError::Unexpected("disk full".into())))
                .status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Error processing file");
    }

    #[test]
    fn identity_failures_use_401_and_403() {
        assert_eq!(
            ApiError::Unauthorized("Access denied".into()).status_and_message().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidCredential.status_and_message(),
            (StatusCode::FORBIDDEN, "Invalid token".to_string())
        );
    }
}
