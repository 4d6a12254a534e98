//! Centralized error types for the chatvox core library.
//!
//! Each concern owns its own `thiserror` enum; this module ties them together:
//! - machine-readable codes via [`ErrorCode`]
//! - HTTP status mapping for the control API
//! - `IntoResponse` for JSON error bodies

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::ingest::ChannelError;
use crate::persistence::PersistenceError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the chatvox service.
#[derive(Debug, Error)]
pub enum ChatvoxError {
    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Referenced queue entry does not exist.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Request conflicts with the current queue state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The ingestion channel is not connected or not accepting sends.
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(#[from] ChannelError),

    /// The session directory could not be prepared.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorCode for ChatvoxError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::EntryNotFound(_) => "entry_not_found",
            Self::Conflict(_) => "conflict",
            Self::ChannelUnavailable(_) => "channel_unavailable",
            Self::Persistence(_) => "persistence_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl ChatvoxError {
    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::EntryNotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ChannelUnavailable(_) | Self::Configuration(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type ChatvoxResult<T> = Result<T, ChatvoxError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ChatvoxError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ChatvoxError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ChatvoxError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}
