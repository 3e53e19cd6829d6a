//! weaver ingestion server
//!
//! Connects to the graph store, initializes the schema, wires the
//! pipeline components, and serves the submission API.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use weaver_domain::{ExtractorConfig, KeywordProcessor, PhraseExtractor};
use weaver_ingest::api::create_router;
use weaver_ingest::{AppConfig, PageService, PipelineService, StorageComponent};
use weaver_pipeline::components::{
    ContentComponent, ContentConfig, KeywordAnalysisComponent, KeywordAnalysisConfig,
    SiteMetadataComponent,
};
use weaver_pipeline::{PipelineOrchestrator, ProcessingStage};
use weaver_store::{GraphConnection, GraphOperations, SchemaManager};

#[derive(Parser, Debug)]
#[command(name = "weaverd", about = "weaver ingestion server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "WEAVER_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address override, host:port
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(rust_log)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            AppConfig::load(path)?
        }
        None => {
            tracing::warn!("no configuration file given, using defaults");
            let mut config = AppConfig::default();
            config.apply_env_overrides();
            config
        }
    };

    tracing::info!(uri = %config.store.uri, "connecting to graph store");
    let store = Arc::new(GraphConnection::connect(config.store.clone()).await?);

    // schema failures are fatal at startup
    let schema = SchemaManager::new(Arc::clone(&store));
    schema.initialize().await?;

    let ops = Arc::new(GraphOperations::new(Arc::clone(&store)));
    let pages = Arc::new(PageService::new(Arc::clone(&ops)));

    let orchestrator = Arc::new(PipelineOrchestrator::new(config.pipeline.clone()));
    orchestrator.register_component(
        ProcessingStage::Metadata,
        Arc::new(SiteMetadataComponent::new()),
    );
    orchestrator.register_component(
        ProcessingStage::Content,
        Arc::new(ContentComponent::new(ContentConfig {
            min_content_length: config.keywords.min_content_length,
        })),
    );
    let extractor = Arc::new(PhraseExtractor::new(ExtractorConfig {
        min_chars: config.keywords.extractor.min_chars,
        max_words: config.keywords.extractor.max_words,
        min_frequency: config.keywords.extractor.min_frequency,
        score_threshold: config.keywords.extractor.score_threshold,
    })?);
    orchestrator.register_component(
        ProcessingStage::Analysis,
        Arc::new(KeywordAnalysisComponent::new(
            KeywordAnalysisConfig {
                relationship_confidence_threshold: config
                    .keywords
                    .relationship_confidence_threshold,
            },
            vec![extractor],
            KeywordProcessor::with_defaults(),
        )),
    );
    orchestrator.register_component(
        ProcessingStage::Storage,
        Arc::new(StorageComponent::new(Arc::clone(&pages))),
    );

    let service = PipelineService::new(
        Arc::clone(&orchestrator),
        Arc::clone(&store),
        config.pipeline.max_concurrent_pages,
        1024,
    );
    service.start().await;

    let bind = args
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    let addr: SocketAddr = bind.parse()?;
    tracing::info!(%addr, "serving submission api");

    let router = create_router(Arc::clone(&service), Arc::clone(&store));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    service.shutdown().await?;
    Ok(())
}
