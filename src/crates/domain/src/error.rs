//! Domain-level error types

use thiserror::Error;

/// Errors produced by the domain layer
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed a structural precondition
    #[error("validation failed: {0}")]
    Validation(String),

    /// Keyword extraction failed
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Keyword or relationship processing failed
    #[error("processing failed: {0}")]
    Processing(String),

    /// A batch operation was used incorrectly
    #[error("batch error: {0}")]
    Batch(String),
}

/// Result type for domain operations
pub type Result<T> = std::result::Result<T, DomainError>;
