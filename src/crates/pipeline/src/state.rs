//! Page state management and URL normalization

use crate::component::{shared_page, SharedPage};
use crate::error::{PipelineError, Result};
use crate::stage::ProcessingStage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;
use weaver_domain::{Page, PageStatus};

/// Parse a URL into its normalized form and registrable domain.
///
/// The registrable domain is the last two labels of the host; `file://`
/// URLs map to `localhost`. The full URL is preserved.
pub fn parse_url(url: &str) -> Result<(String, String)> {
    let parsed =
        Url::parse(url).map_err(|e| PipelineError::Validation(format!("invalid url {url}: {e}")))?;

    if parsed.scheme() == "file" {
        return Ok((url.to_string(), "localhost".to_string()));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| PipelineError::Validation(format!("url has no host: {url}")))?;

    let labels: Vec<&str> = host.split('.').collect();
    let domain = if labels.len() > 2 {
        labels[labels.len() - 2..].join(".")
    } else {
        host.to_string()
    };

    Ok((url.to_string(), domain))
}

/// Tracks pages and their stage history through a pipeline run
pub struct StateManager {
    pages: Mutex<HashMap<Uuid, SharedPage>>,
    stage_history: Mutex<HashMap<Uuid, Vec<ProcessingStage>>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            stage_history: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a page for the URL
    pub async fn initialize_page(&self, url: &str) -> Result<SharedPage> {
        let (normalized_url, domain) = parse_url(url)?;
        let page = Page::new(normalized_url, domain)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        let id = page.id;

        let page = shared_page(page);
        self.pages.lock().await.insert(id, Arc::clone(&page));
        self.stage_history.lock().await.insert(id, Vec::new());
        Ok(page)
    }

    async fn ensure_known(&self, id: Uuid) -> Result<()> {
        if !self.pages.lock().await.contains_key(&id) {
            return Err(PipelineError::State(format!("unknown page id: {id}")));
        }
        Ok(())
    }

    /// Record the stage transition and mark the page in progress
    pub async fn update_stage(&self, page: &SharedPage, stage: ProcessingStage) -> Result<()> {
        let id = page.lock().await.id;
        self.ensure_known(id).await?;

        self.stage_history
            .lock()
            .await
            .entry(id)
            .or_default()
            .push(stage);
        page.lock().await.status = PageStatus::InProgress;
        Ok(())
    }

    /// Mark the run successful
    pub async fn mark_complete(&self, page: &SharedPage) -> Result<()> {
        let id = page.lock().await.id;
        self.ensure_known(id).await?;
        page.lock().await.status = PageStatus::Active;
        Ok(())
    }

    /// Mark the run failed, recording the error on the page
    pub async fn mark_error(&self, page: &SharedPage, error: &str) -> Result<()> {
        let id = page.lock().await.id;
        self.ensure_known(id).await?;
        page.lock().await.mark_error(error);
        Ok(())
    }

    /// Stages the page has entered, in order
    pub async fn stage_history(&self, page_id: Uuid) -> Vec<ProcessingStage> {
        self.stage_history
            .lock()
            .await
            .get(&page_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get_page(&self, page_id: Uuid) -> Option<SharedPage> {
        self.pages.lock().await.get(&page_id).cloned()
    }

    pub async fn get_page_by_url(&self, url: &str) -> Option<SharedPage> {
        for page in self.pages.lock().await.values() {
            if page.lock().await.url == url {
                return Some(Arc::clone(page));
            }
        }
        None
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_extracts_registrable_domain() {
        let (url, domain) = parse_url("https://docs.example.com/path?q=1").unwrap();
        assert_eq!(url, "https://docs.example.com/path?q=1");
        assert_eq!(domain, "example.com");
    }

    #[test]
    fn test_parse_url_short_host() {
        let (_, domain) = parse_url("https://example.com/a").unwrap();
        assert_eq!(domain, "example.com");
    }

    #[test]
    fn test_parse_file_url_is_localhost() {
        let (url, domain) = parse_url("file:///path/to/file.html").unwrap();
        assert_eq!(url, "file:///path/to/file.html");
        assert_eq!(domain, "localhost");
    }

    #[test]
    fn test_parse_invalid_url_fails() {
        assert!(parse_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_initialize_page_registers_history() {
        let state = StateManager::new();
        let page = state.initialize_page("https://example.com/a").await.unwrap();
        let id = page.lock().await.id;
        assert!(state.stage_history(id).await.is_empty());
        assert_eq!(page.lock().await.status, PageStatus::Discovered);
    }

    #[tokio::test]
    async fn test_update_stage_tracks_history() {
        let state = StateManager::new();
        let page = state.initialize_page("https://example.com/a").await.unwrap();
        let id = page.lock().await.id;

        state
            .update_stage(&page, ProcessingStage::Initialize)
            .await
            .unwrap();
        state
            .update_stage(&page, ProcessingStage::Metadata)
            .await
            .unwrap();

        assert_eq!(
            state.stage_history(id).await,
            vec![ProcessingStage::Initialize, ProcessingStage::Metadata]
        );
        assert_eq!(page.lock().await.status, PageStatus::InProgress);
    }

    #[tokio::test]
    async fn test_unknown_page_rejected() {
        let state = StateManager::new();
        let orphan = shared_page(Page::new("https://example.com", "example.com").unwrap());
        assert!(state
            .update_stage(&orphan, ProcessingStage::Initialize)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mark_error_appends_message() {
        let state = StateManager::new();
        let page = state.initialize_page("https://example.com/a").await.unwrap();
        state.mark_error(&page, "boom").await.unwrap();
        let page = page.lock().await;
        assert_eq!(page.status, PageStatus::Error);
        assert_eq!(page.errors, vec!["boom"]);
    }
}
