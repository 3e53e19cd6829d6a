//! Pipeline, stage, and retry configuration

use crate::stage::ProcessingStage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Retry behavior for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between attempts, in seconds
    pub delay_seconds: f64,
    /// Delay cap, in seconds
    pub max_delay_seconds: f64,
    /// Double the delay after each retry
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 1.0,
            max_delay_seconds: 30.0,
            exponential_backoff: true,
        }
    }
}

/// Configuration for one pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub timeout_seconds: f64,
    /// A failed required stage aborts the run; optional stages log and
    /// continue
    pub required: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Run the stage's components in parallel
    pub concurrent_components: bool,
    /// Run component validation before execution
    pub validation_required: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30.0,
            required: true,
            retry: RetryPolicy::default(),
            concurrent_components: true,
            validation_required: true,
        }
    }
}

impl StageConfig {
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.concurrent_components = false;
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.validation_required = false;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Whole-pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_concurrent_pages: usize,
    /// Fallback timeout for stages without explicit configuration
    pub default_timeout: f64,
    pub event_logging_enabled: bool,
    /// Per-stage overrides, keyed by stage name
    pub stages: HashMap<String, StageConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut stages = HashMap::new();
        stages.insert(
            "initialize".to_string(),
            StageConfig::default().with_timeout(5.0),
        );
        stages.insert(
            "metadata".to_string(),
            StageConfig::default().with_timeout(30.0),
        );
        stages.insert(
            "content".to_string(),
            StageConfig::default().with_timeout(60.0),
        );
        stages.insert(
            "analysis".to_string(),
            StageConfig::default().with_timeout(120.0),
        );
        stages.insert(
            "storage".to_string(),
            StageConfig::default().with_timeout(30.0),
        );
        Self {
            max_concurrent_pages: 10,
            default_timeout: 60.0,
            event_logging_enabled: true,
            stages,
        }
    }
}

impl PipelineConfig {
    /// Effective configuration for a stage; unspecified stages get the
    /// defaults with the pipeline-wide timeout
    pub fn stage_config(&self, stage: ProcessingStage) -> StageConfig {
        self.stages
            .get(stage.as_str())
            .cloned()
            .unwrap_or_else(|| StageConfig::default().with_timeout(self.default_timeout))
    }

    pub fn set_stage_config(&mut self, stage: ProcessingStage, config: StageConfig) {
        self.stages.insert(stage.as_str().to_string(), config);
    }

    pub fn with_max_concurrent_pages(mut self, max: usize) -> Self {
        self.max_concurrent_pages = max;
        self
    }
}
