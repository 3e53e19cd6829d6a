//! Pipeline stages

use serde::{Deserialize, Serialize};

/// One named step of the pipeline.
///
/// Pages walk `PROCESSING` in order; `Complete` and `Error` are terminal
/// markers used for state and events only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Initialize,
    Metadata,
    Content,
    Analysis,
    Storage,
    Complete,
    Error,
}

impl ProcessingStage {
    /// The executable stages, in declared order
    pub const PROCESSING: [ProcessingStage; 5] = [
        ProcessingStage::Initialize,
        ProcessingStage::Metadata,
        ProcessingStage::Content,
        ProcessingStage::Analysis,
        ProcessingStage::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Initialize => "initialize",
            ProcessingStage::Metadata => "metadata",
            ProcessingStage::Content => "content",
            ProcessingStage::Analysis => "analysis",
            ProcessingStage::Storage => "storage",
            ProcessingStage::Complete => "complete",
            ProcessingStage::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStage::Complete | ProcessingStage::Error)
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_order() {
        let names: Vec<&str> = ProcessingStage::PROCESSING
            .iter()
            .map(ProcessingStage::as_str)
            .collect();
        assert_eq!(
            names,
            vec!["initialize", "metadata", "content", "analysis", "storage"]
        );
    }

    #[test]
    fn test_terminal_stages_excluded() {
        assert!(ProcessingStage::Complete.is_terminal());
        assert!(ProcessingStage::Error.is_terminal());
        assert!(ProcessingStage::PROCESSING.iter().all(|s| !s.is_terminal()));
    }
}
