//! Content cleaning component
//!
//! Cleans the raw text or HTML, records content metrics, and leaves the
//! cleaned text in the page's custom metadata for the analysis stage.

use crate::component::{ComponentType, PipelineComponent, SharedPage};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde_json::json;
use weaver_domain::HtmlCleaner;

/// Average adult reading speed used for the reading-time estimate
const WORDS_PER_MINUTE: f64 = 200.0;

#[derive(Debug, Clone)]
pub struct ContentConfig {
    /// Minimum cleaned length for meaningful content
    pub min_content_length: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            min_content_length: 100,
        }
    }
}

pub struct ContentComponent {
    config: ContentConfig,
    cleaner: HtmlCleaner,
}

impl ContentComponent {
    pub fn new(config: ContentConfig) -> Self {
        Self {
            config,
            cleaner: HtmlCleaner::new(),
        }
    }
}

impl Default for ContentComponent {
    fn default() -> Self {
        Self::new(ContentConfig::default())
    }
}

#[async_trait]
impl PipelineComponent for ContentComponent {
    fn kind(&self) -> ComponentType {
        ComponentType::Content
    }

    fn name(&self) -> &'static str {
        "ContentComponent"
    }

    async fn validate(&self, page: &SharedPage) -> Result<bool> {
        let content = page.lock().await.content.clone();
        let Some(content) = content.filter(|c| !c.is_empty()) else {
            return Err(PipelineError::Validation(
                "content validation failed: no content available".into(),
            ));
        };

        let cleaned_len = self.cleaner.clean(&content).len();
        if cleaned_len < self.config.min_content_length {
            return Err(PipelineError::Validation(format!(
                "content validation failed: length {cleaned_len} < {}",
                self.config.min_content_length
            )));
        }
        Ok(true)
    }

    async fn process(&self, page: &SharedPage) -> Result<()> {
        let content = page.lock().await.content.clone();
        let Some(content) = content.filter(|c| !c.is_empty()) else {
            return Err(PipelineError::Processing(
                "no content available for processing".into(),
            ));
        };

        let is_html = HtmlCleaner::looks_like_html(&content);
        let cleaned = self.cleaner.clean(&content);
        let word_count = cleaned.split_whitespace().count();
        let reading_time = word_count as f64 / WORDS_PER_MINUTE;

        let mut page = page.lock().await;
        page.metadata.word_count = Some(word_count);
        page.metadata.reading_time_minutes = Some(reading_time);
        page.metadata.source_type = Some(if is_html { "html" } else { "text" }.to_string());
        page.metadata
            .custom
            .insert("cleaned_content".into(), json!(cleaned.clone()));
        page.metadata.custom.insert(
            "content_metrics".into(),
            json!({
                "original_length": content.len(),
                "cleaned_length": cleaned.len(),
                "is_html": is_html,
            }),
        );
        Ok(())
    }
}
