//! Built-in pipeline components

pub mod analysis;
pub mod content;
pub mod metadata;

pub use analysis::{KeywordAnalysisComponent, KeywordAnalysisConfig};
pub use content::{ContentComponent, ContentConfig};
pub use metadata::SiteMetadataComponent;
