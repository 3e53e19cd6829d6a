//! Store error taxonomy and retryability classification

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the store layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query exceeded its deadline
    #[error("query timed out after {timeout_secs}s")]
    QueryTimeout { timeout_secs: u64 },

    /// Query failed to execute
    #[error("query execution failed: {message}")]
    QueryExecution {
        message: String,
        /// Driver error code when one was reported
        code: Option<String>,
        /// Whether the driver classified the failure as transient
        retryable: bool,
    },

    /// Transaction used after completion or otherwise invalid
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Store refused connections
    #[error("store service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Session was closed by the store
    #[error("store session expired: {0}")]
    SessionExpired(String),

    /// Schema initialization or migration failed; fatal at startup
    #[error("schema error: {0}")]
    Schema(String),

    /// Could not establish or maintain the connection
    #[error("connection error: {0}")]
    Connection(String),

    /// A typed graph operation failed
    #[error("graph operation '{operation}' failed: {message}")]
    Operation {
        operation: String,
        message: String,
        details: serde_json::Map<String, serde_json::Value>,
        #[source]
        cause: Option<Box<StoreError>>,
    },

    /// Retries exhausted; carries the recorded retry history
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        first_error_at: DateTime<Utc>,
        error_codes: Vec<String>,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Build a structured operation error
    pub fn operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        cause: Option<StoreError>,
    ) -> Self {
        StoreError::Operation {
            operation: operation.into(),
            message: message.into(),
            details: serde_json::Map::new(),
            cause: cause.map(Box::new),
        }
    }

    pub fn operation_with_details(
        operation: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Map<String, serde_json::Value>,
        cause: Option<StoreError>,
    ) -> Self {
        StoreError::Operation {
            operation: operation.into(),
            message: message.into(),
            details,
            cause: cause.map(Box::new),
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Transient execution failures the driver marks retryable, plus
    /// service-unavailable, session-expired, and query timeouts. Everything
    /// else is fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::QueryExecution { retryable, .. } => *retryable,
            StoreError::ServiceUnavailable(_)
            | StoreError::SessionExpired(_)
            | StoreError::QueryTimeout { .. } => true,
            StoreError::Operation { cause, .. } => {
                cause.as_ref().map(|c| c.is_retryable()).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Driver error code, when one is attached
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::QueryExecution { code, .. } => code.as_deref(),
            StoreError::Operation { cause, .. } => cause.as_ref().and_then(|c| c.code()),
            _ => None,
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::ServiceUnavailable("down".into()).is_retryable());
        assert!(StoreError::SessionExpired("gone".into()).is_retryable());
        assert!(StoreError::QueryTimeout { timeout_secs: 15 }.is_retryable());
        assert!(StoreError::QueryExecution {
            message: "deadlock".into(),
            code: Some("Neo.TransientError.Transaction.DeadlockDetected".into()),
            retryable: true,
        }
        .is_retryable());
        assert!(!StoreError::QueryExecution {
            message: "syntax".into(),
            code: Some("Neo.ClientError.Statement.SyntaxError".into()),
            retryable: false,
        }
        .is_retryable());
        assert!(!StoreError::Schema("bad".into()).is_retryable());
        assert!(!StoreError::InvalidTransaction("done".into()).is_retryable());
    }

    #[test]
    fn test_operation_error_inherits_cause_retryability() {
        let transient = StoreError::ServiceUnavailable("down".into());
        let wrapped = StoreError::operation("create_node", "failed", Some(transient));
        assert!(wrapped.is_retryable());

        let fatal = StoreError::operation("create_node", "failed", None);
        assert!(!fatal.is_retryable());
    }
}
