//! Error types for session lifecycle operations.

use std::time::Duration;

use crate::backend::BackendOp;

/// Failure of a single key-value backend call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or reported an I/O failure.
    #[error("backend unavailable during {op}: {message}")]
    Unavailable { op: BackendOp, message: String },

    /// The call did not complete within the configured per-call timeout.
    #[error("backend {op} timed out after {after:?}")]
    Timeout { op: BackendOp, after: Duration },

    /// The caller cancelled the operation before the call completed.
    #[error("backend {op} cancelled")]
    Cancelled { op: BackendOp },

    /// The backend answered with something the interface does not allow
    /// (e.g. a set operation against a string key).
    #[error("unexpected backend reply to {op}: {message}")]
    Protocol { op: BackendOp, message: String },
}

impl BackendError {
    /// Build an `Unavailable` error from any displayable cause.
    pub fn unavailable(op: BackendOp, cause: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            op,
            message: cause.to_string(),
        }
    }

    /// Build a `Protocol` error from any displayable cause.
    pub fn protocol(op: BackendOp, cause: impl std::fmt::Display) -> Self {
        Self::Protocol {
            op,
            message: cause.to_string(),
        }
    }

    /// The backend operation that failed.
    pub fn op(&self) -> BackendOp {
        match self {
            Self::Unavailable { op, .. }
            | Self::Timeout { op, .. }
            | Self::Cancelled { op }
            | Self::Protocol { op, .. } => *op,
        }
    }

    /// Whether the failure came from caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Error type for session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A required field is missing or invalid, or the expiry is not in the future.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The session does not exist (never created, expired, or deleted).
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session was already revoked.
    #[error("Session already revoked: {0}")]
    AlreadyRevoked(String),

    /// The stored record could not be decoded.
    #[error("Session record {id} is corrupt: {source}")]
    Corruption {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded for storage.
    #[error("Session record {id} could not be encoded: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The key-value backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A multi-step write failed and was rolled back.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: BackendError,
    },
}

impl SessionError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error means the session is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the caller caused this error (bad input, missing session,
    /// double revoke) rather than the service or its backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::AlreadyRevoked(_)
        )
    }
}

/// Result type for session lifecycle operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Result type for raw backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(SessionError::validation("id is required").is_client_error());
        assert!(SessionError::NotFound("s1".into()).is_client_error());
        assert!(SessionError::AlreadyRevoked("s1".into()).is_client_error());

        let backend = SessionError::from(BackendError::unavailable(BackendOp::Get, "refused"));
        assert!(!backend.is_client_error());
        assert!(!backend.is_not_found());
    }

    #[test]
    fn test_encode_failure_is_not_corruption() {
        let source = serde_json::from_str::<u8>("\"x\"").unwrap_err();
        let err = SessionError::Encode {
            id: "s1".into(),
            source,
        };
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("could not be encoded"));
    }

    #[test]
    fn test_backend_error_reports_op() {
        let err = BackendError::Timeout {
            op: BackendOp::Expire,
            after: Duration::from_millis(250),
        };
        assert_eq!(err.op(), BackendOp::Expire);
        assert!(err.to_string().contains("expire"));
        assert!(!err.is_cancelled());
        assert!(BackendError::Cancelled { op: BackendOp::Set }.is_cancelled());
    }
}
