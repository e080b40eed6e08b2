//! API error types with structured JSON responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::sync::SyncError;
use crate::portal::PortalError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unreadable report: {0}")]
    Unprocessable(String),
    /// Portal or vision model failed.
    #[error("Upstream failure ({code}): {message}")]
    Upstream { code: &'static str, message: String },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "SWEEP_IN_PROGRESS", detail),
            ApiError::Unprocessable(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "EXTRACTION_UNREADABLE", detail)
            }
            ApiError::Upstream { code, message } => (StatusCode::BAD_GATEWAY, code, message),
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Portal(PortalError::RecordNotFound { external_id, mrn }) => ApiError::NotFound(
                format!("Record {external_id} for MRN {mrn} is no longer listed by the portal"),
            ),
            SyncError::Portal(e @ PortalError::AuthenticationFailure(_)) => ApiError::Upstream {
                code: "PORTAL_AUTH_FAILED",
                message: e.to_string(),
            },
            SyncError::Portal(e @ PortalError::Session(_)) => ApiError::Upstream {
                code: "PORTAL_UNAVAILABLE",
                message: e.to_string(),
            },
            SyncError::Portal(e @ PortalError::CaptureFailure(_)) => ApiError::Upstream {
                code: "CAPTURE_FAILED",
                message: e.to_string(),
            },
            SyncError::Extraction(ExtractionError::Parse(detail)) => ApiError::Unprocessable(detail),
            SyncError::Extraction(e @ ExtractionError::Vision(_)) => ApiError::Upstream {
                code: "VISION_UNAVAILABLE",
                message: e.to_string(),
            },
            e @ SyncError::SweepInProgress(_) => ApiError::Conflict(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
