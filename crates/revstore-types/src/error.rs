//! Error types for the revstore system.

use thiserror::Error;

/// Unified error type for resource operations.
///
/// `NotFound` is an ordinary outcome, not an exceptional one: callers branch
/// on it routinely (create's existence check, trash's liveness check).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Point lookup found nothing (or only a tombstone)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create against a live identity
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Malformed request or key fields, rejected before any store access
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller presented a stale previous revision
    #[error("Optimistic locking failed: expected resource version {expected}, latest is {actual}")]
    OptimisticLockingFailed { expected: i64, actual: i64 },

    /// Substrate failure, decode failure or cross-store inconsistency
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResourceError {
    /// True for the `NotFound` variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::NotFound(_))
    }
}

impl From<serde_json::Error> for ResourceError {
    fn from(err: serde_json::Error) -> Self {
        ResourceError::Internal(format!("serialization: {}", err))
    }
}
