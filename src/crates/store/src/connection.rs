//! Connection facade: query execution with timeouts, transactions, and
//! pool observability

use crate::backend::{GraphBackend, Params, Row};
use crate::config::ConnectionConfig;
use crate::error::{Result, StoreError};
use crate::neo4j::Neo4jBackend;
use crate::transaction::{Transaction, TransactionManager};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Snapshot of connection usage
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub in_use: u64,
    pub idle: u64,
    pub max_size: u32,
    pub status: String,
}

impl PoolStatus {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "in_use": self.in_use,
            "idle": self.idle,
            "max_size": self.max_size,
            "status": self.status,
        })
    }
}

/// Shared handle to the graph store
pub struct GraphConnection {
    backend: Arc<dyn GraphBackend>,
    config: ConnectionConfig,
    tx_manager: TransactionManager,
    in_flight: AtomicU64,
}

impl GraphConnection {
    /// Connect to the configured store over Bolt
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let backend = Neo4jBackend::connect(&config).await?;
        info!(uri = %config.uri, "graph connection initialized");
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    /// Build a connection over an existing backend (used by tests and
    /// embedded setups)
    pub fn with_backend(backend: Arc<dyn GraphBackend>, config: ConnectionConfig) -> Self {
        let tx_manager = TransactionManager::new(config.transaction.clone());
        Self {
            backend,
            config,
            tx_manager,
            in_flight: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.tx_manager
    }

    /// Begin an explicit transaction
    pub async fn begin(&self) -> Result<Transaction> {
        let inner = self.backend.begin().await?;
        Ok(Transaction::new(inner))
    }

    /// Execute a query with the default per-query timeout.
    ///
    /// With a caller transaction the query joins it; otherwise a one-shot
    /// transaction is opened and committed on success.
    pub async fn execute_query(
        &self,
        query: &str,
        params: &Params,
        tx: Option<&mut Transaction>,
    ) -> Result<Vec<Row>> {
        self.execute_query_with_timeout(
            query,
            params,
            tx,
            Duration::from_secs(self.config.query_timeout),
        )
        .await
    }

    /// Execute a query under an explicit deadline; expiry cancels the
    /// in-flight query and fails with a timeout error
    pub async fn execute_query_with_timeout(
        &self,
        query: &str,
        params: &Params,
        tx: Option<&mut Transaction>,
        timeout: Duration,
    ) -> Result<Vec<Row>> {
        debug!(query = %query.lines().next().unwrap_or_default(), "executing query");
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let result = match tx {
            Some(tx) => tokio::time::timeout(timeout, tx.run(query, params)).await,
            None => tokio::time::timeout(timeout, self.run_one_shot(query, params)).await,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match result {
            Ok(rows) => rows,
            Err(_elapsed) => Err(StoreError::QueryTimeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn run_one_shot(&self, query: &str, params: &Params) -> Result<Vec<Row>> {
        let mut tx = self.begin().await?;
        let rows = match tx.run(query, params).await {
            Ok(rows) => rows,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(e);
            }
        };
        tx.commit().await?;
        Ok(rows)
    }

    /// Current usage snapshot; "at_capacity" once every pooled connection
    /// is in use
    pub fn check_pool(&self) -> PoolStatus {
        let in_use = self.in_flight.load(Ordering::SeqCst);
        let max = u64::from(self.config.max_connection_pool_size);
        PoolStatus {
            in_use,
            idle: max.saturating_sub(in_use),
            max_size: self.config.max_connection_pool_size,
            status: if in_use >= max {
                "at_capacity".to_string()
            } else {
                "healthy".to_string()
            },
        }
    }

    /// Close the store connection; called last during shutdown
    pub async fn shutdown(&self) -> Result<()> {
        info!("closing graph connection");
        self.backend.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    fn connection(backend: Arc<MockBackend>) -> GraphConnection {
        GraphConnection::with_backend(backend, ConnectionConfig::default())
    }

    #[tokio::test]
    async fn test_one_shot_query_commits() {
        let backend = Arc::new(MockBackend::new());
        let conn = connection(backend.clone());

        conn.execute_query("CREATE (n:Page)", &Params::new(), None)
            .await
            .unwrap();
        assert_eq!(backend.commit_count(), 1);
        assert_eq!(backend.rollback_count(), 0);
    }

    #[tokio::test]
    async fn test_caller_transaction_not_committed() {
        let backend = Arc::new(MockBackend::new());
        let conn = connection(backend.clone());

        let mut tx = conn.begin().await.unwrap();
        conn.execute_query("CREATE (n:Page)", &Params::new(), Some(&mut tx))
            .await
            .unwrap();
        assert_eq!(backend.commit_count(), 0);

        tx.commit().await.unwrap();
        assert_eq!(backend.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_one_shot_rolls_back() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next("CREATE", StoreError::Schema("broken".into()));
        let conn = connection(backend.clone());

        let result = conn
            .execute_query("CREATE (n:Page)", &Params::new(), None)
            .await;
        assert!(result.is_err());
        assert_eq!(backend.rollback_count(), 1);
        assert_eq!(backend.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_query_timeout_fails_with_timeout_error() {
        let backend = Arc::new(MockBackend::new());
        backend.delay_queries(Duration::from_millis(200));
        let conn = connection(backend);

        let result = conn
            .execute_query_with_timeout(
                "MATCH (n) RETURN n",
                &Params::new(),
                None,
                Duration::from_millis(10),
            )
            .await;
        match result.unwrap_err() {
            StoreError::QueryTimeout { .. } => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pool_status_reports_capacity() {
        let backend = Arc::new(MockBackend::new());
        let conn = GraphConnection::with_backend(
            backend,
            ConnectionConfig::default().with_pool_size(2),
        );
        let status = conn.check_pool();
        assert_eq!(status.max_size, 2);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.status, "healthy");
    }
}
