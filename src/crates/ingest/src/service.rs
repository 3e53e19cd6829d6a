//! Pipeline service: bounded work queue, worker pool, and task status
//!
//! URL submissions become `Task` and `URL` nodes in one transaction and
//! queue items in memory. A dispatcher keeps up to `max_concurrent`
//! per-URL workers in flight; each worker drives the orchestrator under an
//! outer timeout and guarantees a status update and a queue `task_done` on
//! every exit path. Status reads aggregate from memory first and fall back
//! to the store, repopulating memory after a restart.

use crate::error::{Result, ServiceError};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use weaver_domain::{BatchMetrics, BrowserContext, ProcessingContext};
use weaver_pipeline::PipelineOrchestrator;
use weaver_store::{GraphConnection, StoreError};

/// Outer deadline for one URL's full processing
const WORKER_TIMEOUT: Duration = Duration::from_secs(90);
/// Queue pop timeout inside the dispatcher loop
const QUEUE_POP_TIMEOUT: Duration = Duration::from_secs(1);
/// Dispatcher backoff when saturated or idle
const DISPATCH_IDLE_SLEEP: Duration = Duration::from_millis(100);
const DISPATCH_SATURATED_SLEEP: Duration = Duration::from_millis(500);
/// Store-side deadline for a status read
const STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// One submitted URL with its browser context
#[derive(Debug, Clone)]
pub struct EnqueueItem {
    pub url: String,
    pub context: Option<BrowserContext>,
    pub tab_id: Option<String>,
    pub window_id: Option<String>,
    pub bookmark_id: Option<String>,
}

impl EnqueueItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            context: None,
            tab_id: None,
            window_id: None,
            bookmark_id: None,
        }
    }

    pub fn with_context(mut self, context: BrowserContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_tab(mut self, tab_id: impl Into<String>, window_id: impl Into<String>) -> Self {
        self.tab_id = Some(tab_id.into());
        self.window_id = Some(window_id.into());
        self
    }
}

/// Receipt returned by `enqueue_urls`
#[derive(Debug, Clone)]
pub struct EnqueueReceipt {
    pub task_id: String,
    pub urls_enqueued: usize,
    pub queue_size: usize,
    pub queued_at: DateTime<Utc>,
}

/// Lifecycle state of a task or one of its URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Enqueued,
    Processing,
    Completed,
    Error,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Enqueued => "enqueued",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Error => "error",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "enqueued" | "queued" => Some(TaskState::Enqueued),
            "processing" => Some(TaskState::Processing),
            "completed" => Some(TaskState::Completed),
            "error" => Some(TaskState::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated task status
#[derive(Debug, Clone)]
pub struct TaskStatusReport {
    pub task_id: String,
    pub status: TaskState,
    pub progress: f64,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// In-memory status of one URL; the owning worker is the single writer
#[derive(Debug, Clone)]
struct UrlStatus {
    url: String,
    task_id: String,
    state: TaskState,
    progress: f64,
    queued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    metrics: Option<Value>,
}

#[derive(Debug)]
struct QueueItem {
    url: String,
    task_id: String,
    item: EnqueueItem,
}

/// Bounded FIFO queue with exactly-once completion accounting
struct WorkQueue {
    tx: mpsc::Sender<QueueItem>,
    rx: Mutex<mpsc::Receiver<QueueItem>>,
    outstanding: AtomicUsize,
    done: AtomicUsize,
}

impl WorkQueue {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
            outstanding: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        }
    }

    async fn push(&self, item: QueueItem) -> Result<()> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.tx.send(item).await.map_err(|_| {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            ServiceError::ShuttingDown
        })
    }

    /// Pop the next item, waiting at most `timeout`
    async fn pop(&self, timeout: Duration) -> Option<QueueItem> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Mark one popped item finished; must be called exactly once per item
    fn task_done(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn completed(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }
}

/// Accepts URL submissions and drives them through the pipeline
pub struct PipelineService {
    orchestrator: Arc<PipelineOrchestrator>,
    store: Arc<GraphConnection>,
    queue: Arc<WorkQueue>,
    statuses: Arc<RwLock<HashMap<String, UrlStatus>>>,
    workers: Mutex<HashMap<String, JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    batches: Mutex<ProcessingContext>,
    shutdown_tx: watch::Sender<bool>,
    max_concurrent: usize,
}

impl PipelineService {
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        store: Arc<GraphConnection>,
        max_concurrent: usize,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            orchestrator,
            store,
            queue: Arc::new(WorkQueue::new(queue_capacity)),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            workers: Mutex::new(HashMap::new()),
            dispatcher: Mutex::new(None),
            batches: Mutex::new(ProcessingContext::new()),
            shutdown_tx,
            max_concurrent: max_concurrent.max(1),
        })
    }

    /// Start the dispatcher loop
    pub async fn start(self: &Arc<Self>) {
        let mut dispatcher = self.dispatcher.lock().await;
        if dispatcher.is_some() {
            return;
        }
        let service = Arc::clone(self);
        *dispatcher = Some(tokio::spawn(async move {
            service.dispatch_loop().await;
        }));
        info!(max_concurrent = self.max_concurrent, "pipeline service started");
    }

    /// Submit URLs for processing.
    ///
    /// Task and URL nodes are created in one transaction with a rollback
    /// handler that clears the in-memory entries. A store timeout degrades
    /// to memory-only enqueue under the same task id.
    pub async fn enqueue_urls(&self, items: Vec<EnqueueItem>) -> Result<EnqueueReceipt> {
        if items.is_empty() {
            return Err(ServiceError::Enqueue("no urls supplied".into()));
        }
        let task_id = Uuid::new_v4().to_string();
        let queued_at = Utc::now();

        match self.enqueue_transactional(&task_id, &items, queued_at).await {
            Ok(()) => {}
            Err(ServiceError::Store(StoreError::QueryTimeout { .. })) => {
                warn!(task_id, "store timeout during enqueue, falling back to memory-only");
                self.register_urls(&task_id, &items, queued_at).await;
            }
            Err(e) => return Err(e),
        }

        if let Err(e) = self.batches.lock().await.start_batch(&task_id) {
            debug!(task_id, error = %e, "batch already tracked");
        }

        for item in items.iter() {
            self.queue
                .push(QueueItem {
                    url: item.url.clone(),
                    task_id: task_id.clone(),
                    item: item.clone(),
                })
                .await?;
        }

        info!(task_id, urls = items.len(), "enqueued urls");
        Ok(EnqueueReceipt {
            task_id,
            urls_enqueued: items.len(),
            queue_size: self.queue.len(),
            queued_at,
        })
    }

    async fn register_urls(&self, task_id: &str, items: &[EnqueueItem], queued_at: DateTime<Utc>) {
        let mut statuses = self.statuses.write().await;
        for item in items {
            statuses.insert(
                item.url.clone(),
                UrlStatus {
                    url: item.url.clone(),
                    task_id: task_id.to_string(),
                    state: TaskState::Enqueued,
                    progress: 0.0,
                    queued_at,
                    started_at: None,
                    completed_at: None,
                    error: None,
                    metrics: None,
                },
            );
        }
    }

    async fn enqueue_transactional(
        &self,
        task_id: &str,
        items: &[EnqueueItem],
        queued_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.store.begin().await.map_err(ServiceError::Store)?;

        // register in memory up front; the rollback handler undoes it if
        // the transaction fails
        self.register_urls(task_id, items, queued_at).await;
        let statuses = Arc::clone(&self.statuses);
        let urls: Vec<String> = items.iter().map(|i| i.url.clone()).collect();
        tx.add_rollback_handler(move || async move {
            let mut statuses = statuses.write().await;
            for url in urls {
                statuses.remove(&url);
            }
            Ok(())
        });

        let writes = async {
            let mut params = Map::new();
            params.insert("task_id".into(), json!(task_id));
            params.insert("created_at".into(), json!(queued_at.to_rfc3339()));
            self.store
                .execute_query(
                    "CREATE (t:Task {id: $task_id, created_at: $created_at, status: 'enqueued'})",
                    &params,
                    Some(&mut tx),
                )
                .await?;

            for item in items {
                let mut params = Map::new();
                params.insert("task_id".into(), json!(task_id));
                params.insert("url".into(), json!(item.url));
                params.insert("queued_at".into(), json!(queued_at.to_rfc3339()));
                params.insert(
                    "browser_context".into(),
                    item.context
                        .map(|c| json!(c.as_str()))
                        .unwrap_or(Value::Null),
                );
                params.insert(
                    "tab_id".into(),
                    item.tab_id.as_deref().map(|v| json!(v)).unwrap_or(Value::Null),
                );
                params.insert(
                    "window_id".into(),
                    item.window_id
                        .as_deref()
                        .map(|v| json!(v))
                        .unwrap_or(Value::Null),
                );
                self.store
                    .execute_query(
                        "MATCH (t:Task {id: $task_id})\n\
                         CREATE (u:URL {url: $url, status: 'queued', task_id: $task_id,\n\
                                        progress: 0.0, queued_at: $queued_at,\n\
                                        browser_context: $browser_context,\n\
                                        tab_id: $tab_id, window_id: $window_id})-[:PART_OF]->(t)",
                        &params,
                        Some(&mut tx),
                    )
                    .await?;
            }
            Ok::<(), StoreError>(())
        }
        .await;

        match writes {
            Ok(()) => tx.commit().await.map_err(ServiceError::Store),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(ServiceError::Store(e))
            }
        }
    }

    async fn dispatch_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!("url dispatch loop started");

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            self.reap_finished_workers().await;

            if self.workers.lock().await.len() >= self.max_concurrent {
                tokio::time::sleep(DISPATCH_SATURATED_SLEEP).await;
                continue;
            }

            let Some(item) = self.queue.pop(QUEUE_POP_TIMEOUT).await else {
                tokio::time::sleep(DISPATCH_IDLE_SLEEP).await;
                continue;
            };

            let url = item.url.clone();
            debug!(url = %url, task_id = %item.task_id, "dispatching url");
            let service = Arc::clone(&self);
            let handle = tokio::spawn(async move {
                service.run_worker(item).await;
            });
            self.workers.lock().await.insert(url, handle);
        }

        info!("url dispatch loop stopped");
    }

    async fn reap_finished_workers(&self) {
        let mut workers = self.workers.lock().await;
        let finished: Vec<String> = workers
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(url, _)| url.clone())
            .collect();
        for url in finished {
            if let Some(handle) = workers.remove(&url) {
                if let Err(e) = handle.await {
                    error!(url = %url, error = %e, "worker task panicked");
                }
            }
        }
    }

    /// One URL's worker: outer timeout, status updates, and exactly one
    /// `task_done` on every exit path
    async fn run_worker(self: Arc<Self>, item: QueueItem) {
        let url = item.url.clone();
        let result = tokio::time::timeout(WORKER_TIMEOUT, self.process_url(&item)).await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(url = %url, error = %e, "url processing failed");
                self.set_url_error(&url, &e.to_string()).await;
            }
            Err(_elapsed) => {
                error!(url = %url, "url processing timed out");
                self.set_url_error(
                    &url,
                    &format!("processing timed out after {}s", WORKER_TIMEOUT.as_secs()),
                )
                .await;
            }
        }

        self.queue.task_done();
        self.settle_batch(&item.task_id).await;
        let state = self
            .statuses
            .read()
            .await
            .get(&url)
            .map(|s| s.state)
            .unwrap_or(TaskState::Error);
        debug!(url = %url, state = %state, "worker finished");
    }

    /// Close the batch once every URL of the task has reached a terminal
    /// state
    async fn settle_batch(&self, task_id: &str) {
        let (all_terminal, first_error) = {
            let statuses = self.statuses.read().await;
            let task_urls: Vec<&UrlStatus> = statuses
                .values()
                .filter(|s| s.task_id == task_id)
                .collect();
            let all_terminal = !task_urls.is_empty()
                && task_urls
                    .iter()
                    .all(|s| matches!(s.state, TaskState::Completed | TaskState::Error));
            let first_error = task_urls
                .iter()
                .filter(|s| s.state == TaskState::Error)
                .filter_map(|s| s.error.clone())
                .next();
            (all_terminal, first_error)
        };
        if !all_terminal {
            return;
        }

        let mut batches = self.batches.lock().await;
        let still_open = batches
            .batch(task_id)
            .map(|b| b.end_time.is_none())
            .unwrap_or(false);
        if still_open {
            if let Err(e) = batches.end_batch(task_id, first_error) {
                debug!(task_id, error = %e, "failed to settle batch");
            }
        }
    }

    /// Metrics for one ingest batch, when it is tracked
    pub async fn batch_metrics(&self, task_id: &str) -> Option<BatchMetrics> {
        self.batches.lock().await.metrics(task_id)
    }

    /// Process one URL through the pipeline inside a unit of work
    async fn process_url(&self, item: &QueueItem) -> Result<()> {
        let url = &item.url;
        {
            let mut statuses = self.statuses.write().await;
            if let Some(status) = statuses.get_mut(url) {
                status.state = TaskState::Processing;
                status.started_at = Some(Utc::now());
            }
        }

        let mut tx = self.store.begin().await.map_err(ServiceError::Store)?;
        let statuses = Arc::clone(&self.statuses);
        let rollback_url = url.clone();
        tx.add_rollback_handler(move || async move {
            let mut statuses = statuses.write().await;
            if let Some(status) = statuses.get_mut(&rollback_url) {
                status.state = TaskState::Error;
                status.error = Some("rolled back".to_string());
            }
            Ok(())
        });

        // content arrives through the content component, not the scheduler
        let page = match self.orchestrator.process_page(url, None).await {
            Ok(page) => page,
            Err(e) => {
                let _ = tx.rollback().await;
                self.sync_url_node(url, TaskState::Error, 0.0).await;
                return Err(ServiceError::Pipeline(e));
            }
        };

        if let Some(context) = item.item.context {
            let contexts = {
                let mut page = page.lock().await;
                page.update_browser_context(
                    context,
                    item.item.tab_id.as_deref(),
                    item.item.window_id.as_deref(),
                    item.item.bookmark_id.as_deref(),
                );
                if context.is_tab() {
                    page.record_visit(item.item.tab_id.as_deref(), item.item.window_id.as_deref());
                }
                let mut contexts: Vec<&str> = page
                    .metadata
                    .browser_contexts
                    .iter()
                    .map(BrowserContext::as_str)
                    .collect();
                contexts.sort_unstable();
                contexts.into_iter().map(str::to_string).collect::<Vec<_>>()
            };
            self.sync_page_context(&mut tx, item, &contexts, context.is_tab())
                .await?;
        }

        // the storage stage wrote the page mid-run; record its final state
        {
            let status = page.lock().await.status;
            let mut params = Map::new();
            params.insert("url".into(), json!(url));
            params.insert("status".into(), json!(status.as_str()));
            self.store
                .execute_query(
                    "MATCH (p:Page {url: $url}) SET p.status = $status",
                    &params,
                    Some(&mut tx),
                )
                .await
                .map_err(ServiceError::Store)?;
        }

        tx.commit().await.map_err(ServiceError::Store)?;

        {
            let (metrics, keyword_ids) = {
                let page = page.lock().await;
                let keyword_ids: Vec<String> = page
                    .metadata
                    .custom
                    .get("keyword_details")
                    .and_then(Value::as_array)
                    .map(|keywords| {
                        keywords
                            .iter()
                            .filter_map(|kw| kw.get("id"))
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let metrics = json!({
                    "quality_score": page.metadata.metrics.quality_score,
                    "relevance_score": page.metadata.metrics.relevance_score,
                    "visit_count": page.metadata.metrics.visit_count,
                    "keyword_count": page.metadata.metrics.keyword_count,
                    "processing_time": page.metadata.metrics.processing_time,
                });
                (metrics, keyword_ids)
            };
            {
                let mut batches = self.batches.lock().await;
                for keyword_id in &keyword_ids {
                    if let Err(e) = batches.register_keyword_in(&item.task_id, keyword_id) {
                        debug!(task_id = %item.task_id, error = %e, "keyword attribution skipped");
                        break;
                    }
                }
            }
            let mut statuses = self.statuses.write().await;
            if let Some(status) = statuses.get_mut(url) {
                status.state = TaskState::Completed;
                status.progress = 1.0;
                status.completed_at = Some(Utc::now());
                status.metrics = Some(metrics);
            }
        }
        self.sync_url_node(url, TaskState::Completed, 1.0).await;
        Ok(())
    }

    /// Write the submission's browser context through to the stored page
    async fn sync_page_context(
        &self,
        tx: &mut weaver_store::Transaction,
        item: &QueueItem,
        contexts: &[String],
        record_visit: bool,
    ) -> Result<()> {
        let mut params = Map::new();
        params.insert("url".into(), json!(item.url));
        params.insert("contexts".into(), json!(contexts));
        params.insert(
            "tab_id".into(),
            item.item
                .tab_id
                .as_deref()
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
        );
        params.insert(
            "window_id".into(),
            item.item
                .window_id
                .as_deref()
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
        );
        params.insert("visit_delta".into(), json!(if record_visit { 1 } else { 0 }));
        params.insert("now".into(), json!(Utc::now().to_rfc3339()));

        self.store
            .execute_query(
                "MATCH (p:Page {url: $url})\n\
                 SET p.browser_contexts = $contexts,\n\
                     p.tab_id = $tab_id,\n\
                     p.window_id = $window_id,\n\
                     p.last_accessed = $now,\n\
                     p.metric_visit_count = coalesce(p.metric_visit_count, 0) + $visit_delta,\n\
                     p.metric_last_visited = $now",
                &params,
                Some(tx),
            )
            .await
            .map_err(ServiceError::Store)?;
        Ok(())
    }

    async fn set_url_error(&self, url: &str, message: &str) {
        {
            let mut statuses = self.statuses.write().await;
            if let Some(status) = statuses.get_mut(url) {
                status.state = TaskState::Error;
                status.error = Some(message.to_string());
                status.completed_at = Some(Utc::now());
            }
        }
        self.sync_url_node(url, TaskState::Error, 0.0).await;
    }

    /// Write-through of a URL's state to its node; best effort
    async fn sync_url_node(&self, url: &str, state: TaskState, progress: f64) {
        let mut params = Map::new();
        params.insert("url".into(), json!(url));
        params.insert("status".into(), json!(state.as_str()));
        params.insert("progress".into(), json!(progress));
        if let Err(e) = self
            .store
            .execute_query(
                "MATCH (u:URL {url: $url}) SET u.status = $status, u.progress = $progress",
                &params,
                None,
            )
            .await
        {
            debug!(url, error = %e, "url status write-through failed");
        }
    }

    /// Aggregate the status of a task.
    ///
    /// Memory is the fast path; when the task is unknown there, the store
    /// is queried and the in-memory map repopulated (recovery after a
    /// restart). Unknown tasks are distinguished from failed queries.
    pub async fn get_status(&self, task_id: &str) -> Result<TaskStatusReport> {
        if let Some(report) = self.status_from_memory(task_id).await {
            return Ok(report);
        }
        self.status_from_store(task_id).await?;
        self.status_from_memory(task_id)
            .await
            .ok_or_else(|| ServiceError::TaskNotFound(task_id.to_string()))
    }

    async fn status_from_memory(&self, task_id: &str) -> Option<TaskStatusReport> {
        let statuses = self.statuses.read().await;
        let task_urls: Vec<&UrlStatus> = statuses
            .values()
            .filter(|s| s.task_id == task_id)
            .collect();
        if task_urls.is_empty() {
            return None;
        }

        let progress =
            task_urls.iter().map(|s| s.progress).sum::<f64>() / task_urls.len() as f64;
        let first_error = task_urls
            .iter()
            .filter(|s| s.state == TaskState::Error)
            .filter_map(|s| s.error.clone())
            .next();

        let status = if task_urls.iter().any(|s| s.state == TaskState::Error) {
            TaskState::Error
        } else if task_urls.iter().all(|s| s.state == TaskState::Completed) {
            TaskState::Completed
        } else if task_urls.iter().any(|s| s.state == TaskState::Processing) {
            TaskState::Processing
        } else {
            TaskState::Enqueued
        };

        let message = match status {
            TaskState::Error => format!(
                "task failed: {}",
                first_error.clone().unwrap_or_else(|| "unknown error".into())
            ),
            TaskState::Completed => "task completed successfully".to_string(),
            TaskState::Processing => "task is being processed".to_string(),
            TaskState::Enqueued => "task is queued for processing".to_string(),
        };

        Some(TaskStatusReport {
            task_id: task_id.to_string(),
            status,
            progress,
            message,
            started_at: task_urls.iter().filter_map(|s| s.started_at).min(),
            completed_at: task_urls.iter().filter_map(|s| s.completed_at).max(),
            error: first_error,
        })
    }

    async fn status_from_store(&self, task_id: &str) -> Result<()> {
        let mut params = Map::new();
        params.insert("task_id".into(), json!(task_id));

        let task_rows = self
            .store
            .execute_query_with_timeout(
                "MATCH (t:Task {id: $task_id}) RETURN t.id AS id",
                &params,
                None,
                STATUS_QUERY_TIMEOUT,
            )
            .await
            .map_err(|e| ServiceError::StatusQuery(e.to_string()))?;
        if task_rows.is_empty() {
            return Err(ServiceError::TaskNotFound(task_id.to_string()));
        }

        let url_rows = self
            .store
            .execute_query_with_timeout(
                "MATCH (t:Task {id: $task_id})<-[:PART_OF]-(u:URL)\n\
                 RETURN u.url AS url, u.status AS status, u.progress AS progress",
                &params,
                None,
                STATUS_QUERY_TIMEOUT,
            )
            .await
            .map_err(|e| ServiceError::StatusQuery(e.to_string()))?;

        let mut statuses = self.statuses.write().await;
        for row in &url_rows {
            let Some(url) = row.get("url").and_then(Value::as_str) else {
                continue;
            };
            if statuses.contains_key(url) {
                continue;
            }
            let state = row
                .get("status")
                .and_then(Value::as_str)
                .and_then(TaskState::parse)
                .unwrap_or(TaskState::Enqueued);
            statuses.insert(
                url.to_string(),
                UrlStatus {
                    url: url.to_string(),
                    task_id: task_id.to_string(),
                    state,
                    progress: row.get("progress").and_then(Value::as_f64).unwrap_or(0.0),
                    queued_at: Utc::now(),
                    started_at: None,
                    completed_at: None,
                    error: None,
                    metrics: None,
                },
            );
            debug!(url, task_id, "recovered url status from store");
        }
        Ok(())
    }

    /// Counts for observability endpoints
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn outstanding(&self) -> usize {
        self.queue.outstanding()
    }

    pub fn completed(&self) -> usize {
        self.queue.completed()
    }

    pub async fn in_flight(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Stop the dispatcher, cancel and await workers, drain pending queue
    /// items without processing them, and close the store last
    pub async fn shutdown(&self) -> Result<()> {
        info!("pipeline service shutting down");
        let _ = self.shutdown_tx.send(true);

        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            dispatcher.abort();
            let _ = dispatcher.await;
        }

        let mut workers = self.workers.lock().await;
        for (url, handle) in workers.drain() {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(url = %url, error = %e, "worker ended abnormally");
                }
            }
        }
        drop(workers);

        while self.queue.pop(Duration::from_millis(10)).await.is_some() {
            self.queue.task_done();
        }

        self.store.shutdown().await.map_err(ServiceError::Store)?;
        info!("pipeline service shut down");
        Ok(())
    }
}
