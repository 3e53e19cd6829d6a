//! Store connection and transaction retry configuration

use serde::{Deserialize, Serialize};

/// Retry behavior for transactional work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Maximum attempts, including the first
    pub max_retries: u32,
    /// Initial delay between attempts, in seconds
    pub initial_retry_delay: f64,
    /// Delay cap, in seconds
    pub max_retry_delay: f64,
    /// Multiplier applied after each attempt
    pub backoff_factor: f64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay: 1.0,
            max_retry_delay: 8.0,
            backoff_factor: 2.0,
        }
    }
}

/// Connection settings for the graph store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub max_connection_pool_size: u32,
    /// Connect timeout, in seconds
    pub connection_timeout: u64,
    /// Default per-query timeout, in seconds
    pub query_timeout: u64,
    #[serde(default)]
    pub transaction: TransactionConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: String::new(),
            max_connection_pool_size: 50,
            connection_timeout: 30,
            query_timeout: 15,
            transaction: TransactionConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(uri: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.max_connection_pool_size = size;
        self
    }

    pub fn with_query_timeout(mut self, seconds: u64) -> Self {
        self.query_timeout = seconds;
        self
    }

    pub fn with_transaction_config(mut self, transaction: TransactionConfig) -> Self {
        self.transaction = transaction;
        self
    }
}
