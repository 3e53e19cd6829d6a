//! Ingestion service for weaver
//!
//! Wires the pipeline to the graph store: page aggregate persistence, the
//! transactional storage component, the worker-pool pipeline service, the
//! HTTP submission API, and configuration loading for the `weaverd`
//! binary.

pub mod api;
pub mod config;
pub mod error;
pub mod page;
pub mod service;
pub mod storage;

pub use config::AppConfig;
pub use error::{Result, ServiceError};
pub use page::PageService;
pub use service::{EnqueueItem, EnqueueReceipt, PipelineService, TaskState, TaskStatusReport};
pub use storage::StorageComponent;
