//! Staged processing pipeline for weaver
//!
//! A page moves through a fixed stage sequence (initialize → metadata →
//! content → analysis → storage); each stage runs its registered
//! components under per-stage timeout and retry policies, and the
//! orchestrator turns the outcome into page state and events.

pub mod component;
pub mod components;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod stage;
pub mod state;

pub use component::{shared_page, ComponentType, PipelineComponent, SharedPage};
pub use config::{PipelineConfig, RetryPolicy, StageConfig};
pub use coordinator::{ComponentCoordinator, StageValidation};
pub use error::{PipelineError, Result};
pub use event::{EventKind, EventLevel, EventSystem, ProcessingEvent};
pub use orchestrator::PipelineOrchestrator;
pub use stage::ProcessingStage;
pub use state::{parse_url, StateManager};
