//! Service-level scenarios against the scripted mock store

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use weaver_domain::{BrowserContext, KeywordProcessor};
use weaver_ingest::{EnqueueItem, PageService, PipelineService, StorageComponent, TaskState};
use weaver_pipeline::components::{
    ContentComponent, ContentConfig, KeywordAnalysisComponent, KeywordAnalysisConfig,
    SiteMetadataComponent,
};
use weaver_pipeline::{
    ComponentType, PipelineComponent, PipelineConfig, PipelineOrchestrator, ProcessingStage,
    RetryPolicy, SharedPage, StageConfig,
};
use weaver_store::testing::MockBackend;
use weaver_store::{ConnectionConfig, GraphConnection, GraphOperations, StoreError};

/// Injects canned content during the initialize stage; stands in for the
/// out-of-band content supply
struct ContentInjector {
    contents: HashMap<String, String>,
}

#[async_trait]
impl PipelineComponent for ContentInjector {
    fn kind(&self) -> ComponentType {
        ComponentType::Custom
    }

    fn name(&self) -> &'static str {
        "ContentInjector"
    }

    async fn validate(&self, _page: &SharedPage) -> weaver_pipeline::Result<bool> {
        Ok(true)
    }

    async fn process(&self, page: &SharedPage) -> weaver_pipeline::Result<()> {
        let mut page = page.lock().await;
        if let Some(content) = self.contents.get(&page.url) {
            page.content = Some(content.clone());
        }
        Ok(())
    }
}

fn node_responders(backend: &MockBackend) {
    backend.respond("MERGE (n:Page", |_, params| {
        let props = params.get("properties").cloned().unwrap_or(json!({}));
        let mut row = weaver_store::Row::new();
        row.insert("node".into(), props.clone());
        row.insert(
            "node_id".into(),
            props.get("id").cloned().unwrap_or(json!("p-1")),
        );
        row.insert("node_labels".into(), json!(["Page"]));
        vec![row]
    });
    backend.respond("MERGE (n:Keyword", |_, params| {
        let props = params.get("properties").cloned().unwrap_or(json!({}));
        let mut row = weaver_store::Row::new();
        row.insert("node".into(), props.clone());
        row.insert(
            "node_id".into(),
            props.get("id").cloned().unwrap_or(json!("kw")),
        );
        row.insert("node_labels".into(), json!(["Keyword"]));
        vec![row]
    });
    backend.respond("MERGE (p)-[r:HAS_KEYWORD]->(k)", |_, _| {
        let mut row = weaver_store::Row::new();
        row.insert("rel_type".into(), json!("HAS_KEYWORD"));
        vec![row]
    });
}

fn test_pipeline_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    for stage in ProcessingStage::PROCESSING {
        let mut stage_config = StageConfig::default().with_retry(RetryPolicy {
            max_attempts: 3,
            delay_seconds: 0.01,
            max_delay_seconds: 0.04,
            exponential_backoff: true,
        });
        stage_config.timeout_seconds = 10.0;
        config.set_stage_config(stage, stage_config);
    }
    config
}

fn build_stack(
    backend: Arc<MockBackend>,
    contents: HashMap<String, String>,
) -> Arc<PipelineService> {
    let store = Arc::new(GraphConnection::with_backend(
        backend,
        ConnectionConfig::default(),
    ));
    let ops = Arc::new(GraphOperations::new(Arc::clone(&store)));
    let pages = Arc::new(PageService::new(ops));

    let orchestrator = Arc::new(PipelineOrchestrator::new(test_pipeline_config()));
    orchestrator.register_component(
        ProcessingStage::Initialize,
        Arc::new(ContentInjector { contents }),
    );
    orchestrator.register_component(
        ProcessingStage::Metadata,
        Arc::new(SiteMetadataComponent::new()),
    );
    orchestrator.register_component(
        ProcessingStage::Content,
        Arc::new(ContentComponent::new(ContentConfig {
            min_content_length: 10,
        })),
    );
    orchestrator.register_component(
        ProcessingStage::Analysis,
        Arc::new(KeywordAnalysisComponent::new(
            KeywordAnalysisConfig::default(),
            vec![Arc::new(
                weaver_domain::PhraseExtractor::new(weaver_domain::ExtractorConfig::default())
                    .unwrap(),
            )],
            KeywordProcessor::with_defaults(),
        )),
    );
    orchestrator.register_component(ProcessingStage::Storage, Arc::new(StorageComponent::new(pages)));

    PipelineService::new(orchestrator, store, 4, 64)
}

async fn wait_for_state(
    service: &PipelineService,
    task_id: &str,
    expected: TaskState,
) -> TaskState {
    for _ in 0..500 {
        if let Ok(report) = service.get_status(task_id).await {
            if report.status == expected {
                return report.status;
            }
            if report.status == TaskState::Error && expected != TaskState::Error {
                return report.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {task_id} never reached {expected}");
}

const SHORT_CONTENT: &str = "Graph databases store graph data. Neo4j is a graph database.";

#[tokio::test]
async fn test_happy_path_short_content() {
    let backend = Arc::new(MockBackend::new());
    node_responders(&backend);

    let url = "https://example.com/a";
    let mut contents = HashMap::new();
    contents.insert(url.to_string(), SHORT_CONTENT.to_string());
    let service = build_stack(Arc::clone(&backend), contents);
    service.start().await;

    let receipt = service
        .enqueue_urls(vec![EnqueueItem::new(url)
            .with_context(BrowserContext::ActiveTab)
            .with_tab("t1", "w1")])
        .await
        .unwrap();

    let report_state = wait_for_state(&service, &receipt.task_id, TaskState::Completed).await;
    assert_eq!(report_state, TaskState::Completed);
    let report = service.get_status(&receipt.task_id).await.unwrap();
    assert!((report.progress - 1.0).abs() < f64::EPSILON);

    // the page node was upserted and its final status written through
    let merges = backend.queries_matching("MERGE (n:Page {url: $url})");
    assert!(!merges.is_empty());
    let props = merges.last().unwrap().params.get("properties").unwrap();
    assert_eq!(props.get("domain").unwrap(), "example.com");

    let status_writes = backend.queries_matching("MATCH (p:Page {url: $url}) SET p.status");
    assert_eq!(
        status_writes.last().unwrap().params.get("status").unwrap(),
        "active"
    );

    // keyword nodes cover the expected terms
    let keyword_upserts = backend.queries_matching("MERGE (n:Keyword");
    let normalized: Vec<String> = keyword_upserts
        .iter()
        .filter_map(|q| q.params.get("properties"))
        .filter_map(|p| p.get("normalized_text"))
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    assert!(
        normalized.iter().any(|t| t.contains("graph database")),
        "keywords were {normalized:?}"
    );
    assert!(
        normalized.iter().any(|t| t.contains("neo4j")),
        "keywords were {normalized:?}"
    );

    // at least one RELATED or HIERARCHICAL edge among the keywords,
    // with symmetric endpoints canonically ordered
    let edge_batches: Vec<_> = backend
        .queries_matching("UNWIND")
        .into_iter()
        .filter(|q| q.query.contains("[r:RELATED]") || q.query.contains("[r:HIERARCHICAL]"))
        .collect();
    assert!(!edge_batches.is_empty());
    for batch in &edge_batches {
        if !batch.query.contains("[r:RELATED]") {
            continue;
        }
        for rel in batch
            .params
            .get("relationships")
            .and_then(Value::as_array)
            .unwrap()
        {
            let start = rel.get("start_id").unwrap().as_str().unwrap();
            let end = rel.get("end_id").unwrap().as_str().unwrap();
            assert!(start < end, "symmetric edge not canonicalized: {start} {end}");
        }
    }

    // browser context written through to the page
    let context_writes = backend.queries_matching("SET p.browser_contexts");
    assert_eq!(context_writes.len(), 1);
    assert_eq!(
        context_writes[0].params.get("contexts").unwrap(),
        &json!(["active_tab"])
    );
    assert_eq!(context_writes[0].params.get("tab_id").unwrap(), "t1");

    // the batch settles with its produced keywords attributed
    let mut settled = None;
    for _ in 0..100 {
        if let Some(metrics) = service.batch_metrics(&receipt.task_id).await {
            if metrics.status == weaver_domain::ProcessingStatus::Completed {
                settled = Some(metrics);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let metrics = settled.expect("batch settled");
    assert!(metrics.keyword_count > 0);
}

#[tokio::test]
async fn test_transient_store_failure_retries_once() {
    let backend = Arc::new(MockBackend::new());
    node_responders(&backend);
    backend.fail_next(
        "MERGE (p)-[r:HAS_KEYWORD]->(k)",
        StoreError::QueryExecution {
            message: "deadlock".into(),
            code: Some("Neo.TransientError.Transaction.DeadlockDetected".into()),
            retryable: true,
        },
    );

    let url = "https://example.com/retry";
    let mut contents = HashMap::new();
    contents.insert(
        url.to_string(),
        "Neo4j neo4j neo4j neo4j neo4j neo4j.".to_string(),
    );
    let service = build_stack(Arc::clone(&backend), contents);
    service.start().await;

    let receipt = service
        .enqueue_urls(vec![EnqueueItem::new(url)])
        .await
        .unwrap();
    let state = wait_for_state(&service, &receipt.task_id, TaskState::Completed).await;
    assert_eq!(state, TaskState::Completed);

    // exactly one storage attempt rolled back before the retry committed
    assert_eq!(backend.rollback_count(), 1);

    // attempt one stopped at the first failing edge write; attempt two
    // re-upserted every keyword, so exactly one keyword id repeats and no
    // duplicate nodes are possible
    let keyword_upserts = backend.queries_matching("MERGE (n:Keyword");
    let edge_writes = backend.queries_matching("MERGE (p)-[r:HAS_KEYWORD]->(k)");
    assert_eq!(edge_writes.len(), keyword_upserts.len());

    let distinct_ids: std::collections::BTreeSet<&str> = keyword_upserts
        .iter()
        .filter_map(|q| q.params.get("id"))
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(keyword_upserts.len(), distinct_ids.len() + 1);
}

#[tokio::test]
async fn test_idempotent_resubmission() {
    let backend = Arc::new(MockBackend::new());
    node_responders(&backend);

    let url = "https://example.com/a";
    let mut contents = HashMap::new();
    contents.insert(url.to_string(), SHORT_CONTENT.to_string());
    let service = build_stack(Arc::clone(&backend), contents);
    service.start().await;

    for _ in 0..2 {
        let receipt = service
            .enqueue_urls(vec![EnqueueItem::new(url)])
            .await
            .unwrap();
        let state = wait_for_state(&service, &receipt.task_id, TaskState::Completed).await;
        assert_eq!(state, TaskState::Completed);
    }

    // pages are only ever MERGEd by url, never blindly created
    assert!(backend.queries_matching("CREATE (n:Page").is_empty());
    assert_eq!(backend.queries_matching("MERGE (n:Page {url: $url})").len(), 2);

    // containment edge is MERGEd, so the second run adds no duplicate and
    // the site's page counter only moves when the edge is first created
    let containment = backend.queries_matching("MERGE (s)-[c:CONTAINS]->(p)");
    assert_eq!(containment.len(), 2);
    assert!(containment
        .iter()
        .all(|q| q.query.contains("ON CREATE SET s.page_count")));

    // same canonical+type resolves to the same keyword id on both runs
    let ids_per_run: Vec<std::collections::BTreeSet<String>> = {
        let upserts = backend.queries_matching("MERGE (n:Keyword");
        let half = upserts.len() / 2;
        [&upserts[..half], &upserts[half..]]
            .iter()
            .map(|run| {
                run.iter()
                    .filter_map(|q| q.params.get("id"))
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    };
    assert_eq!(ids_per_run[0], ids_per_run[1]);
}

#[tokio::test]
async fn test_queue_done_exactly_once_under_mixed_outcomes() {
    let backend = Arc::new(MockBackend::new());
    node_responders(&backend);

    let mut contents = HashMap::new();
    contents.insert("https://example.com/ok".to_string(), SHORT_CONTENT.to_string());
    contents.insert(
        "https://example.com/also-ok".to_string(),
        SHORT_CONTENT.to_string(),
    );
    // the third url gets no content and fails content validation
    let service = build_stack(Arc::clone(&backend), contents);
    service.start().await;

    let receipt = service
        .enqueue_urls(vec![
            EnqueueItem::new("https://example.com/ok"),
            EnqueueItem::new("https://example.com/also-ok"),
            EnqueueItem::new("https://example.com/no-content"),
        ])
        .await
        .unwrap();

    // every enqueued url completes its queue slot exactly once
    for _ in 0..500 {
        if service.completed() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(service.completed(), 3);
    assert_eq!(service.outstanding(), 0);

    // the task aggregates to error with the first failure's message
    let report = service.get_status(&receipt.task_id).await.unwrap();
    assert_eq!(report.status, TaskState::Error);
    assert!(report.error.unwrap().contains("content validation failed"));
}

#[tokio::test]
async fn test_status_recovery_from_store_after_restart() {
    let backend = Arc::new(MockBackend::new());
    let task_id = "11111111-2222-3333-4444-555555555555";

    backend.respond("MATCH (t:Task {id: $task_id}) RETURN t.id", move |_, _| {
        let mut row = weaver_store::Row::new();
        row.insert("id".into(), json!(task_id));
        vec![row]
    });
    backend.respond("<-[:PART_OF]-(u:URL)", |_, _| {
        (1..=3)
            .map(|i| {
                let mut row = weaver_store::Row::new();
                row.insert("url".into(), json!(format!("https://example.com/{i}")));
                row.insert("status".into(), json!("queued"));
                row.insert("progress".into(), json!(0.0));
                row
            })
            .collect()
    });

    // fresh service: empty in-memory map, like a restarted process
    let service = build_stack(Arc::clone(&backend), HashMap::new());

    let report = service.get_status(task_id).await.unwrap();
    assert_eq!(report.status, TaskState::Enqueued);
    assert_eq!(report.progress, 0.0);

    // the second read is served from the repopulated memory
    let before = backend.queries_matching("MATCH (t:Task {id: $task_id})").len();
    let report = service.get_status(task_id).await.unwrap();
    assert_eq!(report.status, TaskState::Enqueued);
    let after = backend.queries_matching("MATCH (t:Task {id: $task_id})").len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let backend = Arc::new(MockBackend::new());
    let service = build_stack(Arc::clone(&backend), HashMap::new());

    let result = service.get_status("missing-task").await;
    match result.unwrap_err() {
        weaver_ingest::ServiceError::TaskNotFound(id) => assert_eq!(id, "missing-task"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_enqueue_falls_back_to_memory_on_store_timeout() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_next(
        "CREATE (t:Task",
        StoreError::QueryTimeout { timeout_secs: 15 },
    );
    let service = build_stack(Arc::clone(&backend), HashMap::new());

    let receipt = service
        .enqueue_urls(vec![EnqueueItem::new("https://example.com/degraded")])
        .await
        .unwrap();

    // the task still progresses from memory alone
    let report = service.get_status(&receipt.task_id).await.unwrap();
    assert!(matches!(
        report.status,
        TaskState::Enqueued | TaskState::Processing | TaskState::Error
    ));
}

#[tokio::test]
async fn test_enqueue_failure_rolls_back_memory_registration() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_next(
        "CREATE (u:URL",
        StoreError::QueryExecution {
            message: "constraint violated".into(),
            code: Some("Neo.ClientError.Schema.ConstraintValidationFailed".into()),
            retryable: false,
        },
    );
    let service = build_stack(Arc::clone(&backend), HashMap::new());

    let result = service
        .enqueue_urls(vec![EnqueueItem::new("https://example.com/rejected")])
        .await;
    assert!(result.is_err());
    assert_eq!(backend.rollback_count(), 1);

    // the rollback handler cleared the in-memory registration
    assert!(matches!(
        service.get_status("anything").await.unwrap_err(),
        weaver_ingest::ServiceError::TaskNotFound(_)
    ));
}
