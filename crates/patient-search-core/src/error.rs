//! Error taxonomy for the search core.
//!
//! Validation failures carry a stable machine-readable code so the HTTP
//! layer can render them without string matching. "No matches" is never an
//! error: the engine returns an empty page instead.

use thiserror::Error;

/// Rejected input. Detected before any normalization or index access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user_id is required to scope the request to a tenant")]
    UserIdRequired,

    #[error("invalid user_id: {0}")]
    InvalidUserId(String),

    #[error("invalid parameter '{field}': {message}")]
    InvalidParameter {
        field: &'static str,
        message: String,
    },
}

impl ValidationError {
    /// Machine-readable error code carried in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UserIdRequired => "USER_ID_REQUIRED",
            ValidationError::InvalidUserId(_) => "INVALID_USER_ID",
            ValidationError::InvalidParameter { .. } => "INVALID_PARAMETER",
        }
    }

    /// Hint shown to the caller on how to fix the request.
    pub fn suggestion(&self) -> String {
        match self {
            ValidationError::UserIdRequired => {
                "Add the user_id query parameter identifying the document owner".to_string()
            }
            ValidationError::InvalidUserId(_) => {
                "Provide a non-empty user_id of at most 100 characters using letters, digits, '_', '-', '.' or '@'"
                    .to_string()
            }
            ValidationError::InvalidParameter { field, .. } => {
                format!("Check the value of '{}' and retry", field)
            }
        }
    }

    pub(crate) fn parameter(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError::InvalidParameter {
            field,
            message: message.into(),
        }
    }
}

/// Failure of a search operation.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backing index could not produce a snapshot.
    #[error("patient index unavailable: {0}")]
    Index(#[source] anyhow::Error),
}

impl SearchError {
    pub fn is_validation(&self) -> bool {
        matches!(self, SearchError::Validation(_))
    }
}
