//! Pipeline orchestrator: drives a page through the stage sequence

use crate::component::{ComponentType, PipelineComponent, SharedPage};
use crate::config::{PipelineConfig, StageConfig};
use crate::coordinator::ComponentCoordinator;
use crate::error::{PipelineError, Result};
use crate::event::{EventKind, EventLevel, EventSystem, ProcessingEvent};
use crate::stage::ProcessingStage;
use crate::state::StateManager;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Coordinates state, components, and events for page runs
pub struct PipelineOrchestrator {
    state: Arc<StateManager>,
    coordinator: Arc<ComponentCoordinator>,
    events: Arc<EventSystem>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            state: Arc::new(StateManager::new()),
            coordinator: Arc::new(ComponentCoordinator::new(config.clone())),
            events: Arc::new(EventSystem::new(config.event_logging_enabled)),
            config,
        }
    }

    pub fn with_parts(
        state: Arc<StateManager>,
        coordinator: Arc<ComponentCoordinator>,
        events: Arc<EventSystem>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            state,
            coordinator,
            events,
            config,
        }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn register_component(&self, stage: ProcessingStage, component: Arc<dyn PipelineComponent>) {
        self.coordinator.register_component(stage, component);
    }

    pub fn register_event_handler<F>(&self, handler: F)
    where
        F: Fn(&ProcessingEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.register_handler(handler);
    }

    /// Process one page through every stage.
    ///
    /// On success the page ends `active`; on failure it ends `error` with
    /// the failure recorded, and the error is re-raised to the caller.
    pub async fn process_page(&self, url: &str, content: Option<String>) -> Result<SharedPage> {
        let page = self.state.initialize_page(url).await?;
        page.lock().await.content = content;

        let run_started = Instant::now();
        for stage in ProcessingStage::PROCESSING {
            if let Err(e) = self.process_stage(&page, stage).await {
                self.state.mark_error(&page, &e.to_string()).await?;
                self.emit(
                    &page,
                    EventKind::Error,
                    ProcessingStage::Error,
                    EventLevel::Error,
                    format!("pipeline failed: {e}"),
                    Map::new(),
                )
                .await;
                return Err(e);
            }
        }

        self.state.mark_complete(&page).await?;
        page.lock()
            .await
            .mark_processed(Some(run_started.elapsed().as_secs_f64()));
        self.emit(
            &page,
            EventKind::Complete,
            ProcessingStage::Complete,
            EventLevel::Info,
            "pipeline complete".to_string(),
            Map::new(),
        )
        .await;

        info!(url, "page processed");
        Ok(page)
    }

    /// Run one stage: state update, start event, optional validation,
    /// execution under the stage timeout, then end or error events.
    /// Optional stages absorb their failures.
    async fn process_stage(&self, page: &SharedPage, stage: ProcessingStage) -> Result<()> {
        let config = self.config.stage_config(stage);

        self.state.update_stage(page, stage).await?;
        self.emit(
            page,
            EventKind::StageStart,
            stage,
            EventLevel::Info,
            format!("starting stage {stage}"),
            Map::new(),
        )
        .await;

        let started = Instant::now();
        let result = self.run_stage(page, stage, &config).await;

        match result {
            Ok(()) => {
                let mut extra = Map::new();
                extra.insert("duration".into(), json!(started.elapsed().as_secs_f64()));
                self.emit(
                    page,
                    EventKind::StageEnd,
                    stage,
                    EventLevel::Info,
                    format!("completed stage {stage}"),
                    extra,
                )
                .await;
                Ok(())
            }
            Err(e) => {
                self.emit(
                    page,
                    EventKind::StageError,
                    stage,
                    EventLevel::Error,
                    format!("stage {stage} failed: {e}"),
                    Map::new(),
                )
                .await;
                if config.required {
                    Err(e)
                } else {
                    warn!(stage = %stage, error = %e, "optional stage failed, continuing");
                    Ok(())
                }
            }
        }
    }

    async fn run_stage(
        &self,
        page: &SharedPage,
        stage: ProcessingStage,
        config: &StageConfig,
    ) -> Result<()> {
        if config.validation_required {
            let validation = self.coordinator.validate_stage(page, stage).await?;
            if !validation.passed {
                let message = validation
                    .failures
                    .first()
                    .map(|(_, message)| message.clone())
                    .unwrap_or_else(|| format!("stage {stage} validation failed"));
                return Err(PipelineError::Validation(message));
            }
        }

        let timeout = Duration::from_secs_f64(config.timeout_seconds);
        match tokio::time::timeout(timeout, self.coordinator.execute_stage(page, stage)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PipelineError::Timeout {
                stage,
                timeout_secs: config.timeout_seconds as u64,
            }),
        }
    }

    /// Abort a run: the page is marked failed with reason "aborted".
    /// Already-completed stages are not rolled back; each stage is
    /// expected to have been individually transactional.
    pub async fn abort_processing(&self, page: &SharedPage) -> Result<()> {
        self.state.mark_error(page, "aborted").await?;
        self.emit(
            page,
            EventKind::Error,
            ProcessingStage::Error,
            EventLevel::Error,
            "processing aborted".to_string(),
            Map::new(),
        )
        .await;
        Ok(())
    }

    /// Emit an event enriched with page context: id, component timings,
    /// validation results, and cumulative processing time
    async fn emit(
        &self,
        page: &SharedPage,
        kind: EventKind,
        stage: ProcessingStage,
        level: EventLevel,
        message: String,
        mut metadata: Map<String, Value>,
    ) {
        {
            let page = page.lock().await;
            metadata.insert("page_id".into(), json!(page.id.to_string()));
            metadata.insert("url".into(), json!(page.url));
            let timings = page
                .metadata
                .custom
                .get("component_timings")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let total: f64 = timings
                .as_object()
                .map(|map| map.values().filter_map(Value::as_f64).sum())
                .unwrap_or(0.0);
            metadata.insert("component_timings".into(), timings);
            metadata.insert(
                "validation_results".into(),
                page.metadata
                    .custom
                    .get("validation_results")
                    .cloned()
                    .unwrap_or_else(|| json!({})),
            );
            metadata.insert("total_processing_time".into(), json!(total));
        }

        self.events.emit(&ProcessingEvent {
            kind,
            stage,
            component_type: ComponentType::Custom,
            timestamp: Utc::now(),
            level,
            message,
            metadata,
        });
    }
}
