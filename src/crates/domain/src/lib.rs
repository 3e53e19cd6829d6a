//! Domain model and keyword analysis engine for weaver
//!
//! This crate holds the aggregates the ingestion pipeline produces (pages,
//! sites, keywords, relationships, tasks) together with the pure analysis
//! machinery that turns cleaned text into scored keywords and inter-keyword
//! edges. Everything here is store-agnostic; persistence lives in
//! `weaver-store` and `weaver-ingest`.

pub mod batch;
pub mod error;
pub mod extract;
pub mod keyword;
pub mod page;
pub mod processor;
pub mod relationship;
pub mod site;
pub mod text;
pub mod types;

pub use batch::{BatchContext, BatchMetrics, ProcessingContext};
pub use error::{DomainError, Result};
pub use extract::{ExtractorConfig, KeywordExtractor, PhraseExtractor};
pub use keyword::{KeywordIdentifier, KeywordNormalizer, KeywordValidator, VariantManager};
pub use page::Page;
pub use processor::{KeywordProcessor, ProcessorConfig};
pub use relationship::{
    KeywordRef, KeywordRelationship, RelationshipEvidence, RelationshipManager, SentenceSegmenter,
    SimilarityModel, StoredRelationship,
};
pub use site::Site;
pub use text::{HtmlCleaner, RegexSentenceSegmenter, TextCleaner};
pub use types::{
    BrowserContext, KeywordType, PageMetadata, PageMetrics, PageRelationship, PageStatus,
    ProcessingStatus, RawKeyword, RelationType,
};
