//! Tenant identifiers.
//!
//! Every document belongs to exactly one tenant (the uploading user) and
//! every search is scoped to one. A [`TenantId`] can only be obtained
//! through [`TenantId::parse`], so holding one proves the identifier was
//! present and well formed. There is no "all tenants" value.

use serde::Serialize;
use std::fmt;

use crate::error::ValidationError;

/// Maximum accepted length of a tenant identifier, in characters.
pub const MAX_TENANT_ID_LEN: usize = 100;

/// A validated, non-empty tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Validate a raw identifier as received at the boundary.
    ///
    /// - `None` → [`ValidationError::UserIdRequired`]
    /// - blank → [`ValidationError::InvalidUserId`]
    /// - too long or containing characters outside `[A-Za-z0-9_.@-]`
    ///   → [`ValidationError::InvalidUserId`]
    ///
    /// Surrounding whitespace is trimmed.
    pub fn parse(raw: Option<&str>) -> Result<Self, ValidationError> {
        let raw = raw.ok_or(ValidationError::UserIdRequired)?;
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::InvalidUserId(
                "user_id cannot be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_TENANT_ID_LEN {
            return Err(ValidationError::InvalidUserId(format!(
                "user_id cannot exceed {} characters",
                MAX_TENANT_ID_LEN
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@')))
        {
            return Err(ValidationError::InvalidUserId(format!(
                "user_id contains an unsupported character: {:?}",
                bad
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
