//! Error type shared by the engines.

use crate::store::StoreError;

/// Outcome of a rejected engine operation.
///
/// `Validation` and `Unauthorized` are always raised before any store write
/// is issued, so a caller seeing them knows nothing changed.
#[derive(Debug)]
pub enum SocialError {
    Validation(String),
    Unauthorized(String),
    NotFound(String),
    Store(StoreError),
}

impl std::fmt::Display for SocialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocialError::Validation(msg) => write!(f, "validation failed: {msg}"),
            SocialError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            SocialError::NotFound(msg) => write!(f, "not found: {msg}"),
            SocialError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for SocialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SocialError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SocialError {
    fn from(e: StoreError) -> Self {
        SocialError::Store(e)
    }
}

impl From<serde_json::Error> for SocialError {
    fn from(e: serde_json::Error) -> Self {
        SocialError::Store(StoreError::Serde(e))
    }
}

/// Reject ids that cannot be used as a single store path segment.
pub fn ensure_key(kind: &str, id: &str) -> Result<(), SocialError> {
    if crate::store::path::is_valid_key(id) {
        Ok(())
    } else {
        Err(SocialError::Validation(format!("invalid {kind} id '{id}'")))
    }
}

/// Like [`ensure_key`], and also refuse the ids the global channel and the
/// broadcast inbox live under, which would otherwise alias a user's paths.
pub fn ensure_user_key(kind: &str, id: &str) -> Result<(), SocialError> {
    ensure_key(kind, id)?;
    if id == crate::paths::GLOBAL_THREAD_ID || id == crate::paths::GLOBAL_INBOX_KEY {
        return Err(SocialError::Validation(format!(
            "'{id}' is reserved and cannot be a {kind} id"
        )));
    }
    Ok(())
}
