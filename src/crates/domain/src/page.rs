//! The Page aggregate
//!
//! `Page` is the primary domain object: the pipeline builds one per URL run
//! and the storage layer persists it as a flat property map plus keyword
//! edges.

use crate::error::{DomainError, Result};
use crate::types::{BrowserContext, PageMetadata, PageRelationship, PageStatus, RelationType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// A web page moving through (or persisted by) the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    /// Canonical URL; unique across the store
    pub url: String,
    /// Registrable domain the page belongs to
    pub domain: String,
    pub status: PageStatus,

    pub title: Option<String>,
    /// Keyword text mapped to score in [0, 1]
    pub keywords: HashMap<String, f64>,

    /// Raw input text or HTML; transient, never persisted past the run
    #[serde(skip)]
    pub content: Option<String>,

    pub metadata: PageMetadata,
    pub relationships: Vec<PageRelationship>,
    pub errors: Vec<String>,
}

impl Page {
    /// Create a page in the `discovered` state
    pub fn new(url: impl Into<String>, domain: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let domain = domain.into();
        if url.is_empty() {
            return Err(DomainError::Validation("url is required".into()));
        }
        if domain.is_empty() {
            return Err(DomainError::Validation("domain is required".into()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            url,
            domain,
            status: PageStatus::Discovered,
            title: None,
            keywords: HashMap::new(),
            content: None,
            metadata: PageMetadata::new(Utc::now()),
            relationships: Vec::new(),
            errors: Vec::new(),
        })
    }

    /// Replace the keyword map and keep the keyword-count metric in sync
    pub fn update_keywords(&mut self, keywords: HashMap<String, f64>) {
        self.metadata.metrics.keyword_count = keywords.len();
        self.keywords = keywords;
        self.metadata.updated_at = Some(Utc::now());
    }

    /// Merge custom metadata entries and record the update time
    pub fn update_custom_metadata(&mut self, entries: HashMap<String, Value>) {
        self.metadata.custom.extend(entries);
        self.metadata.updated_at = Some(Utc::now());
    }

    /// Add a relationship to another page, by identifier only
    pub fn add_relationship(
        &mut self,
        target_id: Uuid,
        relation_type: RelationType,
        strength: f64,
    ) {
        self.relationships.push(PageRelationship {
            target_id,
            relation_type,
            strength,
            metadata: HashMap::new(),
        });
        self.metadata.updated_at = Some(Utc::now());
    }

    /// Record a visit, updating tab state when identifiers are supplied
    pub fn record_visit(&mut self, tab_id: Option<&str>, window_id: Option<&str>) {
        let now = Utc::now();
        self.metadata.metrics.last_visited = Some(now);
        self.metadata.metrics.visit_count += 1;
        self.metadata.last_accessed = Some(now);

        if let (Some(tab), Some(window)) = (tab_id, window_id) {
            self.metadata.tab_id = Some(tab.to_string());
            self.metadata.window_id = Some(window.to_string());
            self.metadata.last_active = Some(now);
        }
        self.metadata.updated_at = Some(now);
    }

    /// Add or refresh a browser context
    pub fn update_browser_context(
        &mut self,
        context: BrowserContext,
        tab_id: Option<&str>,
        window_id: Option<&str>,
        bookmark_id: Option<&str>,
    ) {
        self.metadata.browser_contexts.insert(context);

        if context.is_tab() {
            self.metadata.tab_id = tab_id.map(str::to_string);
            self.metadata.window_id = window_id.map(str::to_string);
            self.metadata.last_active = Some(Utc::now());
        } else if context == BrowserContext::Bookmarked {
            self.metadata.bookmark_id = bookmark_id.map(str::to_string);
        }

        self.metadata.updated_at = Some(Utc::now());
    }

    pub fn remove_browser_context(&mut self, context: BrowserContext) {
        self.metadata.browser_contexts.remove(&context);
        self.metadata.updated_at = Some(Utc::now());
    }

    /// Mark the page as successfully processed
    pub fn mark_processed(&mut self, processing_time: Option<f64>) {
        self.status = PageStatus::Active;
        let now = Utc::now();
        self.metadata.processed_at = Some(now);
        self.metadata.updated_at = Some(now);
        if processing_time.is_some() {
            self.metadata.metrics.processing_time = processing_time;
        }
    }

    /// Mark the page as failed, appending the error description
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.status = PageStatus::Error;
        self.errors.push(error.into());
        self.metadata.updated_at = Some(Utc::now());
    }

    /// Flat property projection for the graph store.
    ///
    /// The store holds primitives only: metrics go under a `metric_` prefix,
    /// custom entries under `custom_` (non-primitive custom values are
    /// JSON-encoded), the keyword map is JSON-encoded (the queryable form is
    /// the HAS_KEYWORD edges), and absent values are omitted.
    pub fn to_store_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("id".into(), json!(self.id.to_string()));
        props.insert("url".into(), json!(self.url));
        props.insert("domain".into(), json!(self.domain));
        props.insert("status".into(), json!(self.status.as_str()));
        if let Some(title) = &self.title {
            props.insert("title".into(), json!(title));
        }
        if !self.keywords.is_empty() {
            let encoded = serde_json::to_string(&self.keywords).unwrap_or_default();
            props.insert("keywords".into(), json!(encoded));
        }

        let meta = &self.metadata;
        props.insert("discovered_at".into(), json!(meta.discovered_at.to_rfc3339()));
        if let Some(at) = meta.last_accessed {
            props.insert("last_accessed".into(), json!(at.to_rfc3339()));
        }
        props.insert(
            "metadata_quality_score".into(),
            json!(meta.metadata_quality_score),
        );
        if let Some(tab) = &meta.tab_id {
            props.insert("tab_id".into(), json!(tab));
        }
        if let Some(window) = &meta.window_id {
            props.insert("window_id".into(), json!(window));
        }
        if let Some(bookmark) = &meta.bookmark_id {
            props.insert("bookmark_id".into(), json!(bookmark));
        }
        if let Some(count) = meta.word_count {
            props.insert("word_count".into(), json!(count));
        }
        if let Some(minutes) = meta.reading_time_minutes {
            props.insert("reading_time_minutes".into(), json!(minutes));
        }
        if let Some(language) = &meta.language {
            props.insert("language".into(), json!(language));
        }
        if let Some(source_type) = &meta.source_type {
            props.insert("source_type".into(), json!(source_type));
        }
        if let Some(author) = &meta.author {
            props.insert("author".into(), json!(author));
        }
        if let Some(published) = meta.published_date {
            props.insert("published_date".into(), json!(published.to_rfc3339()));
        }
        if let Some(modified) = meta.modified_date {
            props.insert("modified_date".into(), json!(modified.to_rfc3339()));
        }

        let mut contexts: Vec<&str> = meta
            .browser_contexts
            .iter()
            .map(BrowserContext::as_str)
            .collect();
        contexts.sort_unstable();
        props.insert("browser_contexts".into(), json!(contexts));

        let metrics = &meta.metrics;
        props.insert("metric_quality_score".into(), json!(metrics.quality_score));
        props.insert(
            "metric_relevance_score".into(),
            json!(metrics.relevance_score),
        );
        props.insert("metric_visit_count".into(), json!(metrics.visit_count));
        props.insert("metric_keyword_count".into(), json!(metrics.keyword_count));
        if let Some(time) = metrics.processing_time {
            props.insert("metric_processing_time".into(), json!(time));
        }
        if let Some(at) = metrics.last_visited {
            props.insert("metric_last_visited".into(), json!(at.to_rfc3339()));
        }

        for (key, value) in &meta.custom {
            let flat = match value {
                Value::Null => continue,
                Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
                other => json!(other.to_string()),
            };
            props.insert(format!("custom_{key}"), flat);
        }

        props
    }

    /// Rebuild a page from its flat store properties.
    ///
    /// Unknown or malformed fields fall back to defaults; `id` and `url` are
    /// required.
    pub fn from_store_properties(props: &Map<String, Value>) -> Result<Self> {
        let id = props
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| DomainError::Validation("page node missing id".into()))?;
        let url = props
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::Validation("page node missing url".into()))?
            .to_string();
        let domain = props
            .get("domain")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut page = Page::new(url, if domain.is_empty() { "unknown".into() } else { domain })?;
        page.id = id;
        page.status = props
            .get("status")
            .and_then(Value::as_str)
            .and_then(PageStatus::parse)
            .unwrap_or(PageStatus::Discovered);
        page.title = props
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(encoded) = props.get("keywords").and_then(Value::as_str) {
            if let Ok(keywords) = serde_json::from_str::<HashMap<String, f64>>(encoded) {
                page.keywords = keywords;
            }
        }

        let parse_time = |key: &str| {
            props
                .get(key)
                .and_then(Value::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
        };

        if let Some(at) = parse_time("discovered_at") {
            page.metadata.discovered_at = at;
        }
        page.metadata.last_accessed = parse_time("last_accessed");
        page.metadata.published_date = parse_time("published_date");
        page.metadata.modified_date = parse_time("modified_date");
        page.metadata.metadata_quality_score = props
            .get("metadata_quality_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        page.metadata.tab_id = props.get("tab_id").and_then(Value::as_str).map(Into::into);
        page.metadata.window_id = props
            .get("window_id")
            .and_then(Value::as_str)
            .map(Into::into);
        page.metadata.bookmark_id = props
            .get("bookmark_id")
            .and_then(Value::as_str)
            .map(Into::into);
        page.metadata.word_count = props
            .get("word_count")
            .and_then(Value::as_u64)
            .map(|n| n as usize);
        page.metadata.reading_time_minutes =
            props.get("reading_time_minutes").and_then(Value::as_f64);
        page.metadata.language = props
            .get("language")
            .and_then(Value::as_str)
            .map(Into::into);
        page.metadata.source_type = props
            .get("source_type")
            .and_then(Value::as_str)
            .map(Into::into);
        page.metadata.author = props.get("author").and_then(Value::as_str).map(Into::into);

        if let Some(contexts) = props.get("browser_contexts").and_then(Value::as_array) {
            for value in contexts {
                if let Some(context) = value.as_str().and_then(BrowserContext::parse) {
                    page.metadata.browser_contexts.insert(context);
                }
            }
        }

        let metrics = &mut page.metadata.metrics;
        metrics.quality_score = props
            .get("metric_quality_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        metrics.relevance_score = props
            .get("metric_relevance_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        metrics.visit_count = props
            .get("metric_visit_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        metrics.keyword_count = props
            .get("metric_keyword_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        metrics.processing_time = props.get("metric_processing_time").and_then(Value::as_f64);
        metrics.last_visited = parse_time("metric_last_visited");

        for (key, value) in props {
            if let Some(custom_key) = key.strip_prefix("custom_") {
                page.metadata
                    .custom
                    .insert(custom_key.to_string(), value.clone());
            }
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Page {
        Page::new("https://example.com/a", "example.com").unwrap()
    }

    #[test]
    fn test_new_page_is_discovered() {
        let page = page();
        assert_eq!(page.status, PageStatus::Discovered);
        assert!(page.errors.is_empty());
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(Page::new("", "example.com").is_err());
        assert!(Page::new("https://example.com", "").is_err());
    }

    #[test]
    fn test_update_keywords_syncs_count() {
        let mut page = page();
        let mut keywords = HashMap::new();
        keywords.insert("graph database".to_string(), 0.8);
        keywords.insert("neo4j".to_string(), 0.7);
        page.update_keywords(keywords);
        assert_eq!(page.metadata.metrics.keyword_count, page.keywords.len());
    }

    #[test]
    fn test_mark_error_appends_message() {
        let mut page = page();
        page.mark_error("analysis timed out after 1s");
        assert_eq!(page.status, PageStatus::Error);
        assert_eq!(page.errors, vec!["analysis timed out after 1s"]);
    }

    #[test]
    fn test_tab_context_records_identifiers() {
        let mut page = page();
        page.update_browser_context(BrowserContext::ActiveTab, Some("t1"), Some("w1"), None);
        assert!(page.metadata.browser_contexts.contains(&BrowserContext::ActiveTab));
        assert_eq!(page.metadata.tab_id.as_deref(), Some("t1"));
        assert_eq!(page.metadata.window_id.as_deref(), Some("w1"));
    }

    #[test]
    fn test_record_visit_increments() {
        let mut page = page();
        page.record_visit(Some("t1"), Some("w1"));
        page.record_visit(None, None);
        assert_eq!(page.metadata.metrics.visit_count, 2);
        assert!(page.metadata.metrics.last_visited.is_some());
    }

    #[test]
    fn test_store_properties_round_trip() {
        let mut page = page();
        page.title = Some("Example".to_string());
        page.metadata.language = Some("en".to_string());
        page.metadata.word_count = Some(250);
        page.update_browser_context(BrowserContext::ActiveTab, Some("t1"), Some("w1"), None);
        let mut keywords = HashMap::new();
        keywords.insert("neo4j".to_string(), 0.7);
        page.update_keywords(keywords);
        page.mark_processed(Some(1.5));

        let props = page.to_store_properties();
        assert_eq!(props.get("status").unwrap(), "active");
        assert!(props.get("content").is_none());

        let rebuilt = Page::from_store_properties(&props).unwrap();
        assert_eq!(rebuilt.id, page.id);
        assert_eq!(rebuilt.url, page.url);
        assert_eq!(rebuilt.status, PageStatus::Active);
        assert_eq!(rebuilt.keywords.get("neo4j"), Some(&0.7));
        assert_eq!(rebuilt.metadata.word_count, Some(250));
        assert!(rebuilt
            .metadata
            .browser_contexts
            .contains(&BrowserContext::ActiveTab));
    }

    #[test]
    fn test_custom_metadata_flattened_with_prefix() {
        let mut page = page();
        let mut custom = HashMap::new();
        custom.insert("content_type".to_string(), json!("article"));
        custom.insert("timings".to_string(), json!({"ContentComponent": 0.2}));
        page.update_custom_metadata(custom);

        let props = page.to_store_properties();
        assert_eq!(props.get("custom_content_type").unwrap(), "article");
        // nested values are stored as encoded strings
        assert!(props.get("custom_timings").unwrap().is_string());
    }
}
