//! Core enums and value types shared across the domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Types of keywords that can be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordType {
    Entity,
    Concept,
    Term,
    Custom,
}

impl KeywordType {
    /// Stable string form used for identity hashing and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordType::Entity => "entity",
            KeywordType::Concept => "concept",
            KeywordType::Term => "term",
            KeywordType::Custom => "custom",
        }
    }

    /// Parse the stable string form back into a type
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "entity" => Some(KeywordType::Entity),
            "concept" => Some(KeywordType::Concept),
            "term" => Some(KeywordType::Term),
            "custom" => Some(KeywordType::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeywordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Types of relationships between keywords and between pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Synonym,
    Related,
    Hierarchical,
    /// Direct link
    LinksTo,
    /// Content similarity
    SimilarTo,
    /// Temporal relationship; declared for forward compatibility, no
    /// detector produces it yet
    Precedes,
    /// Citation or reference
    References,
    /// Containment
    PartOf,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Synonym => "synonym",
            RelationType::Related => "related",
            RelationType::Hierarchical => "hierarchical",
            RelationType::LinksTo => "links_to",
            RelationType::SimilarTo => "similar_to",
            RelationType::Precedes => "precedes",
            RelationType::References => "references",
            RelationType::PartOf => "part_of",
        }
    }

    /// Symmetric types have no meaningful direction; endpoints are stored
    /// in canonical lexicographic order
    pub fn is_symmetric(&self) -> bool {
        matches!(self, RelationType::Synonym | RelationType::Related)
    }

    /// Storage form of the relationship type (upper snake case edge label)
    pub fn edge_type(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Browser context a page was seen in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserContext {
    /// Currently focused tab
    ActiveTab,
    /// Open but not focused
    OpenTab,
    /// Not currently open
    Background,
    /// Saved in bookmarks
    Bookmarked,
    /// In browser history only
    History,
}

impl BrowserContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserContext::ActiveTab => "active_tab",
            BrowserContext::OpenTab => "open_tab",
            BrowserContext::Background => "background",
            BrowserContext::Bookmarked => "bookmarked",
            BrowserContext::History => "history",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active_tab" => Some(BrowserContext::ActiveTab),
            "open_tab" => Some(BrowserContext::OpenTab),
            "background" => Some(BrowserContext::Background),
            "bookmarked" => Some(BrowserContext::Bookmarked),
            "history" => Some(BrowserContext::History),
            _ => None,
        }
    }

    /// Whether this context refers to a live tab and therefore requires
    /// tab and window identifiers
    pub fn is_tab(&self) -> bool {
        matches!(self, BrowserContext::ActiveTab | BrowserContext::OpenTab)
    }
}

impl std::fmt::Display for BrowserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of a page in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// URL known but not yet processed
    Discovered,
    /// Currently being processed
    InProgress,
    /// Successfully processed and active
    Active,
    /// In browser history only
    History,
    /// Processing failed
    Error,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Discovered => "discovered",
            PageStatus::InProgress => "in_progress",
            PageStatus::Active => "active",
            PageStatus::History => "history",
            PageStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "discovered" => Some(PageStatus::Discovered),
            "in_progress" => Some(PageStatus::InProgress),
            "active" => Some(PageStatus::Active),
            "history" => Some(PageStatus::History),
            "error" => Some(PageStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of batch or document processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// A keyword as initially extracted, before normalization and merging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawKeyword {
    /// The keyword text as found in the content
    pub text: String,
    /// Raw score from the extraction method, in [0, 1]
    pub score: f64,
    /// Name of the extractor that produced this keyword
    pub source: String,
    /// Number of occurrences in the text
    pub frequency: u32,
    /// (start, end) character positions in the text
    pub positions: Vec<(usize, usize)>,
    /// Extractor-specific metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RawKeyword {
    pub fn new(text: impl Into<String>, score: f64, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score,
            source: source.into(),
            frequency: 1,
            positions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A relationship from one page to another, held by identifier only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRelationship {
    pub target_id: Uuid,
    pub relation_type: RelationType,
    pub strength: f64,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Metrics tracked for a page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetrics {
    pub quality_score: f64,
    pub relevance_score: f64,
    pub last_visited: Option<DateTime<Utc>>,
    pub visit_count: u64,
    pub processing_time: Option<f64>,
    pub keyword_count: usize,
}

impl PageMetrics {
    /// Blend metadata quality and keyword quality into the overall score
    pub fn update_quality(&mut self, metadata_quality: f64, keyword_quality: f64) {
        self.quality_score = (metadata_quality + keyword_quality) / 2.0;
    }
}

/// Metadata associated with a page beyond its core content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetadata {
    /// When the URL was first seen; required
    pub discovered_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,

    pub metadata_quality_score: f64,

    // Browser context for the current session only
    pub tab_id: Option<String>,
    pub window_id: Option<String>,
    pub bookmark_id: Option<String>,
    pub browser_contexts: HashSet<BrowserContext>,

    // Content quality signals
    pub word_count: Option<usize>,
    pub reading_time_minutes: Option<f64>,
    pub language: Option<String>,

    pub source_type: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,

    /// Arbitrary nested metadata; flattened with a `custom_` prefix when
    /// persisted
    pub custom: HashMap<String, serde_json::Value>,

    pub metrics: PageMetrics,
}

impl PageMetadata {
    pub fn new(discovered_at: DateTime<Utc>) -> Self {
        Self {
            discovered_at,
            last_accessed: None,
            last_active: None,
            updated_at: None,
            processed_at: None,
            metadata_quality_score: 0.0,
            tab_id: None,
            window_id: None,
            bookmark_id: None,
            browser_contexts: HashSet::new(),
            word_count: None,
            reading_time_minutes: None,
            language: None,
            source_type: None,
            author: None,
            published_date: None,
            modified_date: None,
            custom: HashMap::new(),
            metrics: PageMetrics::default(),
        }
    }
}

impl Default for PageMetadata {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
