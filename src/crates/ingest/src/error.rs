//! Service-layer errors

use thiserror::Error;
use weaver_pipeline::PipelineError;
use weaver_store::StoreError;

/// Errors surfaced by the ingestion services
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The task id is unknown (404-like)
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The status query itself failed (5xx-like)
    #[error("status query failed: {0}")]
    StatusQuery(String),

    /// Submission was rejected
    #[error("enqueue failed: {0}")]
    Enqueue(String),

    /// The service is shutting down
    #[error("service unavailable: shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
