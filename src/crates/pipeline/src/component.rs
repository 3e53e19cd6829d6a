//! Component contract

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use weaver_domain::Page;

/// A page shared across a stage's components.
///
/// Components of a concurrent stage lock it briefly to read inputs and
/// write results; they own disjoint page fields and must not rely on one
/// another's mutations.
pub type SharedPage = Arc<Mutex<Page>>;

/// Wrap a page for pipeline processing
pub fn shared_page(page: Page) -> SharedPage {
    Arc::new(Mutex::new(page))
}

/// Component categories, for observability only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Metadata,
    Content,
    Keyword,
    Browser,
    Storage,
    Custom,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Metadata => "metadata",
            ComponentType::Content => "content",
            ComponentType::Keyword => "keyword",
            ComponentType::Browser => "browser",
            ComponentType::Storage => "storage",
            ComponentType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pluggable unit of work for one stage
#[async_trait]
pub trait PipelineComponent: Send + Sync {
    /// Component category
    fn kind(&self) -> ComponentType;

    /// Name used in timings and validation results
    fn name(&self) -> &'static str;

    /// Cheap precondition check. Returns `Ok(false)` or an explanatory
    /// `PipelineError::Validation` when the page cannot be processed.
    async fn validate(&self, page: &SharedPage) -> Result<bool>;

    /// Do the work. May mutate the page and perform transactional side
    /// effects; must be safe to retry.
    async fn process(&self, page: &SharedPage) -> Result<()>;
}
