//! Pipeline events and synchronous handler dispatch

use crate::component::ComponentType;
use crate::stage::ProcessingStage;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::RwLock;
use tracing::{debug, error};

/// What an event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    StageStart,
    StageEnd,
    StageError,
    Complete,
    Error,
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

/// One pipeline event
#[derive(Debug, Clone)]
pub struct ProcessingEvent {
    pub kind: EventKind,
    pub stage: ProcessingStage,
    pub component_type: ComponentType,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub message: String,
    /// Page id, component timings, validation results, cumulative time
    pub metadata: Map<String, Value>,
}

type Handler = Box<dyn Fn(&ProcessingEvent) -> anyhow::Result<()> + Send + Sync>;

/// Dispatches events to handlers in registration order.
///
/// Handlers run synchronously; a failing handler is logged and does not
/// disturb the pipeline or the remaining handlers.
pub struct EventSystem {
    handlers: RwLock<Vec<Handler>>,
    logging_enabled: bool,
}

impl EventSystem {
    pub fn new(logging_enabled: bool) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            logging_enabled,
        }
    }

    pub fn register_handler<F>(&self, handler: F)
    where
        F: Fn(&ProcessingEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().unwrap().push(Box::new(handler));
    }

    pub fn clear_handlers(&self) {
        self.handlers.write().unwrap().clear();
    }

    pub fn emit(&self, event: &ProcessingEvent) {
        if self.logging_enabled {
            debug!(
                stage = %event.stage,
                kind = ?event.kind,
                message = %event.message,
                "pipeline event"
            );
        }
        for handler in self.handlers.read().unwrap().iter() {
            if let Err(e) = handler(event) {
                error!(error = %e, stage = %event.stage, "event handler failed");
            }
        }
    }
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new(true)
    }
}
