//! Neo4j backend over the Bolt protocol

use crate::backend::{BackendTransaction, GraphBackend, Params, Row};
use crate::config::ConnectionConfig;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, Graph, Query, Txn};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// Bolt-backed graph store connection
pub struct Neo4jBackend {
    graph: Graph,
}

impl Neo4jBackend {
    /// Connect and verify connectivity
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let driver_config = neo4rs::ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.username)
            .password(&config.password)
            .max_connections(config.max_connection_pool_size as usize)
            .build()
            .map_err(|e| StoreError::Connection(format!("invalid driver config: {e}")))?;

        let graph = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout),
            Graph::connect(driver_config),
        )
        .await
        .map_err(|_| {
            StoreError::Connection(format!(
                "connect timed out after {}s",
                config.connection_timeout
            ))
        })?
        .map_err(|e| StoreError::Connection(format!("failed to connect: {e}")))?;

        debug!(uri = %config.uri, "connected to graph store");
        Ok(Self { graph })
    }

    fn build_query(query: &str, params: &Params) -> Query {
        let mut q = Query::new(query.to_string());
        for (key, value) in params {
            q = q.param(key, json_to_bolt(value));
        }
        q
    }
}

/// Map a driver error onto the store taxonomy.
///
/// Server failures carry their status code in the message; transient codes
/// and availability failures are the retryable set.
fn map_driver_error(err: neo4rs::Error) -> StoreError {
    let message = err.to_string();
    if message.contains("ServiceUnavailable") {
        return StoreError::ServiceUnavailable(message);
    }
    if message.contains("SessionExpired") {
        return StoreError::SessionExpired(message);
    }

    let code = extract_error_code(&message);
    let retryable = code
        .as_deref()
        .map(|c| c.contains("TransientError"))
        .unwrap_or(false)
        || message.contains("connection")
        || message.contains("Connection");
    StoreError::QueryExecution {
        message,
        code,
        retryable,
    }
}

fn extract_error_code(message: &str) -> Option<String> {
    message
        .split_whitespace()
        .find(|token| token.starts_with("Neo."))
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '.').to_string())
}

fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::from(i)
            } else {
                BoltType::from(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt_map = BoltMap::new();
            for (key, item) in map {
                bolt_map.put(BoltString::from(key.as_str()), json_to_bolt(item));
            }
            BoltType::Map(bolt_map)
        }
    }
}

fn row_to_json(row: &neo4rs::Row) -> Result<Row> {
    let value: Value = row.to().map_err(|e| StoreError::QueryExecution {
        message: format!("failed to decode result row: {e}"),
        code: None,
        retryable: false,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Row::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

#[async_trait]
impl GraphBackend for Neo4jBackend {
    async fn run(&self, query: &str, params: &Params) -> Result<Vec<Row>> {
        let mut stream = self
            .graph
            .execute(Self::build_query(query, params))
            .await
            .map_err(map_driver_error)?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(map_driver_error)? {
            rows.push(row_to_json(&row)?);
        }
        Ok(rows)
    }

    async fn begin(&self) -> Result<Box<dyn BackendTransaction>> {
        let txn = self.graph.start_txn().await.map_err(map_driver_error)?;
        Ok(Box::new(Neo4jTransaction { txn }))
    }

    async fn close(&self) -> Result<()> {
        // the driver pool tears down on drop
        Ok(())
    }
}

struct Neo4jTransaction {
    txn: Txn,
}

#[async_trait]
impl BackendTransaction for Neo4jTransaction {
    async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Row>> {
        let mut stream = self
            .txn
            .execute(Neo4jBackend::build_query(query, params))
            .await
            .map_err(map_driver_error)?;

        let mut rows = Vec::new();
        while let Some(row) = stream
            .next(self.txn.handle())
            .await
            .map_err(map_driver_error)?
        {
            rows.push(row_to_json(&row)?);
        }
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit().await.map_err(|e| {
            error!("transaction commit failed: {e}");
            map_driver_error(e)
        })
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.txn.rollback().await.map_err(map_driver_error)
    }
}
