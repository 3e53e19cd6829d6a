//! Scripted mock backend for tests
//!
//! Stands in for the Bolt driver: canned responses keyed on query
//! substrings, one-shot failure injection for retry paths, and recorded
//! queries plus commit/rollback counters for assertions.

use crate::backend::{BackendTransaction, GraphBackend, Params, Row};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn Fn(&str, &Params) -> Vec<Row> + Send + Sync>;

/// One executed query, as recorded by the mock
#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub query: String,
    pub params: Params,
    pub in_transaction: bool,
}

#[derive(Default)]
struct MockState {
    responders: Vec<(String, Responder)>,
    planned_failures: Vec<(String, Option<StoreError>)>,
    queries: Vec<RecordedQuery>,
    begin_count: usize,
    commit_count: usize,
    rollback_count: usize,
    fail_next_commit: bool,
    delay: Option<Duration>,
}

/// In-memory stand-in for the graph backend
#[derive(Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to queries containing `pattern` with the closure's rows
    pub fn respond<F>(&self, pattern: impl Into<String>, responder: F)
    where
        F: Fn(&str, &Params) -> Vec<Row> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .unwrap()
            .responders
            .push((pattern.into(), Box::new(responder)));
    }

    /// Respond to queries containing `pattern` with fixed rows
    pub fn respond_with_rows(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.respond(pattern, move |_, _| rows.clone());
    }

    /// Fail the next query containing `pattern` with the given error, once
    pub fn fail_next(&self, pattern: impl Into<String>, error: StoreError) {
        self.state
            .lock()
            .unwrap()
            .planned_failures
            .push((pattern.into(), Some(error)));
    }

    /// Make the next commit fail
    pub fn fail_next_commit(&self) {
        self.state.lock().unwrap().fail_next_commit = true;
    }

    /// Delay every query, for timeout tests
    pub fn delay_queries(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.state.lock().unwrap().queries.clone()
    }

    /// Recorded queries containing the given fragment
    pub fn queries_matching(&self, fragment: &str) -> Vec<RecordedQuery> {
        self.queries()
            .into_iter()
            .filter(|q| q.query.contains(fragment))
            .collect()
    }

    pub fn begin_count(&self) -> usize {
        self.state.lock().unwrap().begin_count
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commit_count
    }

    pub fn rollback_count(&self) -> usize {
        self.state.lock().unwrap().rollback_count
    }

    fn delay(&self) -> Option<Duration> {
        self.state.lock().unwrap().delay
    }

    fn execute(&self, query: &str, params: &Params, in_transaction: bool) -> Result<Vec<Row>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(RecordedQuery {
            query: query.to_string(),
            params: params.clone(),
            in_transaction,
        });

        if let Some(position) = state
            .planned_failures
            .iter()
            .position(|(pattern, error)| query.contains(pattern.as_str()) && error.is_some())
        {
            let (_, error) = &mut state.planned_failures[position];
            let error = error.take().expect("checked above");
            state.planned_failures.remove(position);
            return Err(error);
        }

        for (pattern, responder) in &state.responders {
            if query.contains(pattern.as_str()) {
                return Ok(responder(query, params));
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl GraphBackend for MockBackend {
    async fn run(&self, query: &str, params: &Params) -> Result<Vec<Row>> {
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }
        self.execute(query, params, false)
    }

    async fn begin(&self) -> Result<Box<dyn BackendTransaction>> {
        self.state.lock().unwrap().begin_count += 1;
        Ok(Box::new(MockTransaction {
            state: Arc::clone(&self.state),
            backend: MockBackend {
                state: Arc::clone(&self.state),
            },
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MockTransaction {
    state: Arc<Mutex<MockState>>,
    backend: MockBackend,
}

#[async_trait]
impl BackendTransaction for MockTransaction {
    async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Row>> {
        if let Some(delay) = self.backend.delay() {
            tokio::time::sleep(delay).await;
        }
        self.backend.execute(query, params, true)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_commit {
            state.fail_next_commit = false;
            return Err(StoreError::QueryExecution {
                message: "commit failed".into(),
                code: None,
                retryable: false,
            });
        }
        state.commit_count += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().rollback_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_responders_match_by_substring() {
        let backend = MockBackend::new();
        let mut row = Row::new();
        row.insert("version".to_string(), json!("1.1"));
        backend.respond_with_rows("SchemaVersion", vec![row]);

        let rows = backend
            .run("MATCH (s:SchemaVersion) RETURN s.version AS version", &Params::new())
            .await
            .unwrap();
        assert_eq!(rows[0].get("version").unwrap(), "1.1");

        let rows = backend.run("MATCH (p:Page)", &Params::new()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_one_shot_failure() {
        let backend = MockBackend::new();
        backend.fail_next(
            "CREATE",
            StoreError::QueryExecution {
                message: "transient".into(),
                code: Some("Neo.TransientError.General.TransactionMemoryLimit".into()),
                retryable: true,
            },
        );

        assert!(backend.run("CREATE (n)", &Params::new()).await.is_err());
        assert!(backend.run("CREATE (n)", &Params::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_records_transaction_queries() {
        let backend = MockBackend::new();
        let mut tx = backend.begin().await.unwrap();
        tx.run("CREATE (n:Task)", &Params::new()).await.unwrap();
        tx.commit().await.unwrap();

        let recorded = backend.queries_matching("Task");
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].in_transaction);
        assert_eq!(backend.commit_count(), 1);
    }
}
