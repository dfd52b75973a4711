//! HTTP error envelope.
//!
//! Every error response has the same body:
//!
//! ```json
//! {
//!   "error_code": "INVALID_USER_ID",
//!   "message": "invalid user_id: user_id cannot be empty",
//!   "request_id": "6f1c0b7e-...",
//!   "suggestion": "Provide a non-empty user_id ..."
//! }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `USER_ID_REQUIRED`, `INVALID_USER_ID` | 400 |
//! | `NOT_FOUND` | 404 |
//! | `INVALID_PARAMETER` | 422 |
//! | `INTERNAL_ERROR` | 500 |
//! | `UPSTREAM_CREDENTIAL_ERROR` | 502 |
//!
//! `request_id` is a fresh UUID v4 per error so a caller's report can be
//! matched to the server log line.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use patient_search_core::{SearchError, ValidationError};

use crate::credentials::CredentialError;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error_code: String,
    pub message: String,
    pub request_id: String,
    pub suggestion: String,
}

/// Error type returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub suggestion: String,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            message,
            "Check the request path",
        )
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_PARAMETER",
            message,
            "Check the query parameters and retry",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            message,
            "Retry later; if the problem persists report the request_id",
        )
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let status = match err {
            ValidationError::UserIdRequired | ValidationError::InvalidUserId(_) => {
                StatusCode::BAD_REQUEST
            }
            ValidationError::InvalidParameter { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        debug!(code = err.code(), error = %err, "rejected request");
        Self::new(status, err.code(), err.to_string(), err.suggestion())
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Validation(v) => v.into(),
            SearchError::Index(e) => {
                error!(error = %e, "patient index failure");
                Self::internal("patient index unavailable")
            }
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match &err {
            CredentialError::Upstream { .. } | CredentialError::Transport(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_CREDENTIAL_ERROR",
                err.to_string(),
                "The credential service could not issue a token; retry later",
            ),
            CredentialError::InvalidBlobName(_) => Self::invalid_parameter(err.to_string()),
            CredentialError::NotConfigured(_) => Self::not_found(err.to_string()),
            CredentialError::Configuration(_) => {
                warn!(error = %err, "credential configuration error");
                Self::internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error_code: self.code.to_string(),
            message: self.message,
            request_id: uuid::Uuid::new_v4().to_string(),
            suggestion: self.suggestion,
        };
        (self.status, Json(body)).into_response()
    }
}
