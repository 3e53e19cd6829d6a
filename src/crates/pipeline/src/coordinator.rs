//! Stage coordinator: runs a stage's components with retry and records
//! per-component timings and validation outcomes

use crate::component::{PipelineComponent, SharedPage};
use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::{PipelineError, Result};
use crate::stage::ProcessingStage;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Outcome of validating one stage
#[derive(Debug, Clone)]
pub struct StageValidation {
    pub passed: bool,
    /// Failed components with their explanation
    pub failures: Vec<(String, String)>,
}

/// Per-stage component registry and executor
pub struct ComponentCoordinator {
    config: PipelineConfig,
    components: RwLock<HashMap<ProcessingStage, Vec<Arc<dyn PipelineComponent>>>>,
}

impl ComponentCoordinator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            components: RwLock::new(HashMap::new()),
        }
    }

    /// Register a component for a stage; registration order is preserved
    pub fn register_component(&self, stage: ProcessingStage, component: Arc<dyn PipelineComponent>) {
        debug!(stage = %stage, component = component.name(), "registered component");
        self.components
            .write()
            .unwrap()
            .entry(stage)
            .or_default()
            .push(component);
    }

    /// Components registered for a stage, in registration order
    pub fn stage_components(&self, stage: ProcessingStage) -> Vec<Arc<dyn PipelineComponent>> {
        self.components
            .read()
            .unwrap()
            .get(&stage)
            .cloned()
            .unwrap_or_default()
    }

    /// Run all components for a stage, concurrently or sequentially per
    /// the stage configuration. Empty stages return immediately.
    pub async fn execute_stage(&self, page: &SharedPage, stage: ProcessingStage) -> Result<()> {
        let components = self.stage_components(stage);
        if components.is_empty() {
            return Ok(());
        }
        let config = self.config.stage_config(stage);

        if config.concurrent_components {
            let runs = components
                .iter()
                .map(|component| self.run_with_retry(Arc::clone(component), page, &config.retry));
            let results = futures::future::join_all(runs).await;
            for result in results {
                if let Err(e) = result {
                    return Err(PipelineError::Stage {
                        stage,
                        message: e.to_string(),
                    });
                }
            }
        } else {
            for component in components {
                if let Err(e) = self.run_with_retry(component, page, &config.retry).await {
                    return Err(PipelineError::Stage {
                        stage,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run one component under the retry policy, recording its elapsed
    /// time on success
    async fn run_with_retry(
        &self,
        component: Arc<dyn PipelineComponent>,
        page: &SharedPage,
        retry: &RetryPolicy,
    ) -> Result<()> {
        let name = component.name();
        let mut attempts: u32 = 0;
        let mut delay = retry.delay_seconds;

        loop {
            let started = Instant::now();
            match component.process(page).await {
                Ok(()) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    record_timing(page, name, elapsed).await;
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= retry.max_attempts {
                        error!(component = name, attempts, error = %e, "component exhausted retries");
                        return Err(PipelineError::Component {
                            component: name.to_string(),
                            attempts,
                            message: e.to_string(),
                        });
                    }

                    warn!(component = name, attempt = attempts, error = %e, "component failed, retrying");
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    if retry.exponential_backoff {
                        delay = (delay * 2.0).min(retry.max_delay_seconds);
                    }
                }
            }
        }
    }

    /// Validate every component individually.
    ///
    /// A component whose validation errors counts as `false` without
    /// aborting the stage; per-component outcomes land in the page's
    /// custom metadata under `validation_results`.
    pub async fn validate_stage(
        &self,
        page: &SharedPage,
        stage: ProcessingStage,
    ) -> Result<StageValidation> {
        let components = self.stage_components(stage);
        if components.is_empty() {
            return Ok(StageValidation {
                passed: true,
                failures: Vec::new(),
            });
        }

        let mut outcomes: Map<String, Value> = Map::new();
        let mut failures = Vec::new();

        for component in components {
            let name = component.name();
            match component.validate(page).await {
                Ok(true) => {
                    outcomes.insert(name.to_string(), json!(true));
                }
                Ok(false) => {
                    outcomes.insert(name.to_string(), json!(false));
                    failures.push((
                        name.to_string(),
                        format!("{name} validation returned false"),
                    ));
                }
                Err(e) => {
                    error!(component = name, error = %e, "validation failed");
                    outcomes.insert(name.to_string(), json!(false));
                    failures.push((name.to_string(), e.to_string()));
                }
            }
        }

        record_validation(page, stage, outcomes).await;
        Ok(StageValidation {
            passed: failures.is_empty(),
            failures,
        })
    }
}

async fn record_timing(page: &SharedPage, component: &str, elapsed: f64) {
    let mut page = page.lock().await;
    let timings = page
        .metadata
        .custom
        .entry("component_timings".to_string())
        .or_insert_with(|| json!({}));
    if let Some(map) = timings.as_object_mut() {
        map.insert(component.to_string(), json!(elapsed));
    }
}

async fn record_validation(page: &SharedPage, stage: ProcessingStage, outcomes: Map<String, Value>) {
    let mut page = page.lock().await;
    let results = page
        .metadata
        .custom
        .entry("validation_results".to_string())
        .or_insert_with(|| json!({}));
    if let Some(map) = results.as_object_mut() {
        map.insert(stage.as_str().to_string(), Value::Object(outcomes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{shared_page, ComponentType};
    use crate::config::StageConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use weaver_domain::Page;

    struct FlakyComponent {
        name: &'static str,
        fail_times: u32,
        calls: AtomicU32,
    }

    impl FlakyComponent {
        fn new(name: &'static str, fail_times: u32) -> Self {
            Self {
                name,
                fail_times,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PipelineComponent for FlakyComponent {
        fn kind(&self) -> ComponentType {
            ComponentType::Custom
        }

        fn name(&self) -> &'static str {
            self.name
        }

        async fn validate(&self, _page: &SharedPage) -> Result<bool> {
            Ok(true)
        }

        async fn process(&self, _page: &SharedPage) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(PipelineError::Processing("transient failure".into()))
            } else {
                Ok(())
            }
        }
    }

    struct RejectingComponent;

    #[async_trait]
    impl PipelineComponent for RejectingComponent {
        fn kind(&self) -> ComponentType {
            ComponentType::Content
        }

        fn name(&self) -> &'static str {
            "RejectingComponent"
        }

        async fn validate(&self, _page: &SharedPage) -> Result<bool> {
            Err(PipelineError::Validation(
                "content validation failed: length 50 < 100".into(),
            ))
        }

        async fn process(&self, _page: &SharedPage) -> Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        for stage in ProcessingStage::PROCESSING {
            config.set_stage_config(
                stage,
                StageConfig::default().with_retry(RetryPolicy {
                    max_attempts: 3,
                    delay_seconds: 0.001,
                    max_delay_seconds: 0.004,
                    exponential_backoff: true,
                }),
            );
        }
        config
    }

    fn page() -> SharedPage {
        shared_page(Page::new("https://example.com/a", "example.com").unwrap())
    }

    #[tokio::test]
    async fn test_empty_stage_is_noop() {
        let coordinator = ComponentCoordinator::new(fast_config());
        coordinator
            .execute_stage(&page(), ProcessingStage::Metadata)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_component_retried_then_succeeds() {
        let coordinator = ComponentCoordinator::new(fast_config());
        let component = Arc::new(FlakyComponent::new("Flaky", 2));
        coordinator.register_component(ProcessingStage::Content, component.clone());

        let page = page();
        coordinator
            .execute_stage(&page, ProcessingStage::Content)
            .await
            .unwrap();
        assert_eq!(component.calls.load(Ordering::SeqCst), 3);

        // timing recorded on success
        let page = page.lock().await;
        let timings = page.metadata.custom.get("component_timings").unwrap();
        assert!(timings.get("Flaky").is_some());
    }

    #[tokio::test]
    async fn test_retry_bound_respected() {
        let coordinator = ComponentCoordinator::new(fast_config());
        let component = Arc::new(FlakyComponent::new("AlwaysFails", u32::MAX));
        coordinator.register_component(ProcessingStage::Content, component.clone());

        let result = coordinator
            .execute_stage(&page(), ProcessingStage::Content)
            .await;

        // max_attempts = 3: no more than three process calls per run
        assert_eq!(component.calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            PipelineError::Stage { stage, message } => {
                assert_eq!(stage, ProcessingStage::Content);
                assert!(message.contains("AlwaysFails"));
                assert!(message.contains("3 attempts"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_sequential_stage_preserves_order() {
        let mut config = fast_config();
        config.set_stage_config(
            ProcessingStage::Storage,
            StageConfig::default().sequential().with_retry(RetryPolicy {
                max_attempts: 1,
                delay_seconds: 0.001,
                max_delay_seconds: 0.001,
                exponential_backoff: false,
            }),
        );
        let coordinator = ComponentCoordinator::new(config);

        let first = Arc::new(FlakyComponent::new("First", 0));
        let second = Arc::new(FlakyComponent::new("Second", 0));
        coordinator.register_component(ProcessingStage::Storage, first.clone());
        coordinator.register_component(ProcessingStage::Storage, second.clone());

        let page = page();
        coordinator
            .execute_stage(&page, ProcessingStage::Storage)
            .await
            .unwrap();

        let page = page.lock().await;
        let timings = page.metadata.custom.get("component_timings").unwrap();
        assert!(timings.get("First").is_some());
        assert!(timings.get("Second").is_some());
    }

    #[tokio::test]
    async fn test_validation_failure_recorded_not_thrown() {
        let coordinator = ComponentCoordinator::new(fast_config());
        coordinator.register_component(ProcessingStage::Content, Arc::new(RejectingComponent));
        coordinator.register_component(
            ProcessingStage::Content,
            Arc::new(FlakyComponent::new("Healthy", 0)),
        );

        let page = page();
        let validation = coordinator
            .validate_stage(&page, ProcessingStage::Content)
            .await
            .unwrap();

        assert!(!validation.passed);
        assert_eq!(validation.failures.len(), 1);
        assert_eq!(
            validation.failures[0].1,
            "content validation failed: length 50 < 100"
        );

        let page = page.lock().await;
        let results = page.metadata.custom.get("validation_results").unwrap();
        let content = results.get("content").unwrap();
        assert_eq!(content.get("RejectingComponent").unwrap(), false);
        assert_eq!(content.get("Healthy").unwrap(), true);
    }
}
