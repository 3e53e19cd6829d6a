//! Keyword analysis component
//!
//! Fans the cleaned content out to the configured extractors, merges and
//! scores the raw keywords, detects inter-keyword relationships, and
//! writes both onto the page for the storage stage.

use crate::component::{ComponentType, PipelineComponent, SharedPage};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use weaver_domain::{
    HtmlCleaner, KeywordExtractor, KeywordProcessor, KeywordRef, RawKeyword, RegexSentenceSegmenter,
    RelationshipManager, SentenceSegmenter, SimilarityModel,
};

#[derive(Debug, Clone)]
pub struct KeywordAnalysisConfig {
    /// Minimum aggregated confidence for a relationship to be persisted
    pub relationship_confidence_threshold: f64,
}

impl Default for KeywordAnalysisConfig {
    fn default() -> Self {
        Self {
            relationship_confidence_threshold: 0.5,
        }
    }
}

pub struct KeywordAnalysisComponent {
    config: KeywordAnalysisConfig,
    extractors: Vec<Arc<dyn KeywordExtractor>>,
    processor: KeywordProcessor,
    segmenter: Arc<dyn SentenceSegmenter>,
    similarity: Option<Arc<dyn SimilarityModel>>,
    cleaner: HtmlCleaner,
}

impl KeywordAnalysisComponent {
    pub fn new(
        config: KeywordAnalysisConfig,
        extractors: Vec<Arc<dyn KeywordExtractor>>,
        processor: KeywordProcessor,
    ) -> Self {
        Self {
            config,
            extractors,
            processor,
            segmenter: Arc::new(RegexSentenceSegmenter::new()),
            similarity: None,
            cleaner: HtmlCleaner::new(),
        }
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn SentenceSegmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_similarity_model(mut self, model: Arc<dyn SimilarityModel>) -> Self {
        self.similarity = Some(model);
        self
    }

    /// Cleaned content left by the content stage, falling back to
    /// cleaning the raw content directly
    async fn cleaned_content(&self, page: &SharedPage) -> Option<String> {
        let page = page.lock().await;
        if let Some(cleaned) = page
            .metadata
            .custom
            .get("cleaned_content")
            .and_then(|v| v.as_str())
        {
            return Some(cleaned.to_string());
        }
        page.content.as_ref().map(|c| self.cleaner.clean(c))
    }

    fn extract_all(&self, content: &str) -> Vec<Vec<RawKeyword>> {
        let mut groups = Vec::new();
        for extractor in &self.extractors {
            match extractor.extract(content) {
                Ok(keywords) => {
                    debug!(
                        extractor = extractor.name(),
                        count = keywords.len(),
                        "extractor finished"
                    );
                    groups.push(keywords);
                }
                Err(e) => {
                    warn!(extractor = extractor.name(), error = %e, "extractor failed");
                }
            }
        }
        groups
    }
}

#[async_trait]
impl PipelineComponent for KeywordAnalysisComponent {
    fn kind(&self) -> ComponentType {
        ComponentType::Keyword
    }

    fn name(&self) -> &'static str {
        "KeywordAnalysisComponent"
    }

    async fn validate(&self, page: &SharedPage) -> Result<bool> {
        let page = page.lock().await;
        let has_content = page.content.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
            || page.metadata.custom.contains_key("cleaned_content");
        if !has_content {
            return Err(PipelineError::Validation(
                "analysis validation failed: no content to analyze".into(),
            ));
        }
        Ok(true)
    }

    async fn process(&self, page: &SharedPage) -> Result<()> {
        let started = Instant::now();
        let Some(cleaned) = self.cleaned_content(page).await else {
            return Err(PipelineError::Processing(
                "no content available for analysis".into(),
            ));
        };
        let document_id = page.lock().await.id.to_string();

        let raw_groups = self.extract_all(&cleaned);
        if raw_groups.iter().all(Vec::is_empty) {
            warn!("no keywords found by any extractor");
        }

        let keywords = self.processor.process_keywords(&raw_groups);

        let mut manager = RelationshipManager::new().with_segmenter(Arc::clone(&self.segmenter));
        if let Some(model) = &self.similarity {
            manager = manager.with_similarity_model(Arc::clone(model));
        }

        let refs: Vec<KeywordRef> = keywords
            .iter()
            .map(|kw| KeywordRef {
                id: kw.id.clone(),
                canonical_text: kw.canonical_text.clone(),
                keyword_type: kw.keyword_type,
            })
            .collect();
        manager.detect_relationships(&refs, &cleaned, &document_id);
        let relationships =
            manager.prepare_for_storage(self.config.relationship_confidence_threshold);

        let keyword_scores: HashMap<String, f64> = keywords
            .iter()
            .map(|kw| (kw.canonical_text.clone(), kw.score))
            .collect();

        let mut page = page.lock().await;
        page.update_keywords(keyword_scores);
        page.metadata
            .custom
            .insert("relationships".into(), json!(relationships));
        page.metadata
            .custom
            .insert("keyword_details".into(), json!(keywords));
        page.metadata.metrics.processing_time = Some(started.elapsed().as_secs_f64());

        debug!(
            keywords = keywords.len(),
            relationships = relationships.len(),
            "analysis finished"
        );
        Ok(())
    }
}
