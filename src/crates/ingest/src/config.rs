//! Application configuration
//!
//! Loaded from a TOML file (path via `--config` or `WEAVER_CONFIG`), with
//! store credentials overridable through the environment. Every block has
//! working defaults so a bare config file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use weaver_pipeline::PipelineConfig;
use weaver_store::ConnectionConfig;

/// Keyword extractor tuning block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    pub min_chars: usize,
    pub max_words: usize,
    pub min_frequency: u32,
    pub score_threshold: f64,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            min_chars: 3,
            max_words: 4,
            min_frequency: 1,
            score_threshold: 0.5,
        }
    }
}

/// Keyword engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordEngineConfig {
    pub min_content_length: usize,
    pub min_keyword_score: f64,
    pub max_variants: usize,
    pub relationship_confidence_threshold: f64,
    #[serde(default)]
    pub extractor: ExtractorSettings,
    /// Domains whose pages skip keyword analysis entirely
    #[serde(default)]
    pub skip_domains: Vec<String>,
    /// DOM-node count above which a page is treated as too complex to
    /// analyze inline
    pub complex_dom_threshold: usize,
    /// Maximum script tags tolerated before content is flagged
    pub max_js_scripts: usize,
}

impl Default for KeywordEngineConfig {
    fn default() -> Self {
        Self {
            min_content_length: 100,
            min_keyword_score: 0.3,
            max_variants: 5,
            relationship_confidence_threshold: 0.5,
            extractor: ExtractorSettings::default(),
            skip_domains: Vec::new(),
            complex_dom_threshold: 5000,
            max_js_scripts: 200,
        }
    }
}

/// HTTP server block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8686,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: ConnectionConfig,
    #[serde(default)]
    pub keywords: KeywordEngineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment
    /// overrides for store credentials (`WEAVER_STORE_URI`,
    /// `WEAVER_STORE_USER`, `WEAVER_STORE_PASSWORD`)
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(uri) = std::env::var("WEAVER_STORE_URI") {
            self.store.uri = uri;
        }
        if let Ok(user) = std::env::var("WEAVER_STORE_USER") {
            self.store.username = user;
        }
        if let Ok(password) = std::env::var("WEAVER_STORE_PASSWORD") {
            self.store.password = password;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weaver_pipeline::ProcessingStage;

    #[test]
    fn test_defaults_are_complete() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.max_concurrent_pages, 10);
        assert_eq!(config.store.max_connection_pool_size, 50);
        assert_eq!(config.keywords.min_content_length, 100);
        assert_eq!(config.keywords.extractor.max_words, 4);
        assert_eq!(config.server.port, 8686);
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            [pipeline]
            max_concurrent_pages = 4
            default_timeout = 30.0
            event_logging_enabled = false

            [pipeline.stages.analysis]
            timeout_seconds = 10.0
            required = true
            concurrent_components = false
            validation_required = true

            [store]
            uri = "bolt://db:7687"
            username = "neo4j"
            password = "secret"
            max_connection_pool_size = 20
            connection_timeout = 10
            query_timeout = 5

            [keywords]
            min_content_length = 50
            min_keyword_score = 0.4
            max_variants = 3
            relationship_confidence_threshold = 0.6
            skip_domains = ["internal.example.com"]
            complex_dom_threshold = 1000
            max_js_scripts = 50
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.pipeline.max_concurrent_pages, 4);
        assert_eq!(
            config
                .pipeline
                .stage_config(ProcessingStage::Analysis)
                .timeout_seconds,
            10.0
        );
        assert_eq!(config.store.uri, "bolt://db:7687");
        assert_eq!(config.keywords.skip_domains, vec!["internal.example.com"]);
        // unspecified blocks fall back to defaults
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.keywords.extractor.min_chars, 3);
    }
}
