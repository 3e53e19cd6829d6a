//! Pipeline error taxonomy

use crate::stage::ProcessingStage;
use thiserror::Error;

/// Errors raised while driving a page through the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A precondition check failed; the message is surfaced verbatim on
    /// the page
    #[error("{0}")]
    Validation(String),

    /// A component exhausted its retries
    #[error("component {component} failed after {attempts} attempts: {message}")]
    Component {
        component: String,
        attempts: u32,
        message: String,
    },

    /// A stage failed as a whole
    #[error("stage {stage} failed: {message}")]
    Stage {
        stage: ProcessingStage,
        message: String,
    },

    /// A stage exceeded its deadline
    #[error("stage {stage} timed out after {timeout_secs}s")]
    Timeout {
        stage: ProcessingStage,
        timeout_secs: u64,
    },

    /// Page bookkeeping failed (unknown page, invalid transition)
    #[error("pipeline state error: {0}")]
    State(String),

    /// A component-internal failure
    #[error("{0}")]
    Processing(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
