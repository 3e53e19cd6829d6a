//! Transaction wrapper with rollback handlers, and the retrying executor
//!
//! A `Transaction` is a scoped unit of work: queries run inside it, user
//! compensations registered along the way run LIFO on rollback, and a
//! failed commit rolls back automatically before surfacing. The
//! `TransactionManager` retries retryable failures with exponential
//! backoff, keeping per-transaction retry history that is attached to the
//! error when attempts run out.

use crate::backend::{BackendTransaction, Params, Row};
use crate::config::TransactionConfig;
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Compensation run on rollback; failures are logged, not propagated
pub type RollbackHandler = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// An active unit of work against the graph store
pub struct Transaction {
    id: String,
    inner: Option<Box<dyn BackendTransaction>>,
    rollback_handlers: Vec<RollbackHandler>,
}

impl Transaction {
    pub(crate) fn new(inner: Box<dyn BackendTransaction>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            inner: Some(inner),
            rollback_handlers: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register a compensation; handlers run in reverse registration order
    /// on rollback and must be idempotent
    pub fn add_rollback_handler<F, Fut>(&mut self, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.rollback_handlers
            .push(Box::new(move || Box::pin(handler())));
    }

    /// Run a query inside this transaction
    pub async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Row>> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| StoreError::InvalidTransaction("transaction already completed".into()))?;
        inner.run(query, params).await
    }

    /// Commit the transaction.
    ///
    /// A commit failure first rolls back (running compensations) and then
    /// surfaces the original error.
    pub async fn commit(mut self) -> Result<()> {
        let inner = self
            .inner
            .take()
            .ok_or_else(|| StoreError::InvalidTransaction("transaction already completed".into()))?;

        match inner.commit().await {
            Ok(()) => {
                debug!(tx_id = %self.id, "transaction committed");
                self.rollback_handlers.clear();
                Ok(())
            }
            Err(commit_error) => {
                error!(tx_id = %self.id, error = %commit_error, "commit failed, running rollback handlers");
                self.run_rollback_handlers().await;
                Err(commit_error)
            }
        }
    }

    /// Roll back the transaction, then run each registered handler.
    ///
    /// A failing handler is logged and does not prevent the remaining
    /// handlers from running.
    pub async fn rollback(mut self) -> Result<()> {
        if let Some(inner) = self.inner.take() {
            if let Err(e) = inner.rollback().await {
                error!(tx_id = %self.id, error = %e, "backend rollback failed");
            }
        }
        self.run_rollback_handlers().await;
        Ok(())
    }

    async fn run_rollback_handlers(&mut self) {
        for handler in self.rollback_handlers.drain(..).rev() {
            if let Err(e) = handler().await {
                error!(tx_id = %self.id, error = %e, "rollback handler failed");
            }
        }
    }
}

/// Retry history for one logical transaction
#[derive(Debug, Clone)]
pub struct RetryStats {
    pub first_error_at: DateTime<Utc>,
    pub last_error_at: DateTime<Utc>,
    pub attempts: u32,
    pub error_codes: Vec<String>,
}

/// Executes transactional work with retry and backoff
pub struct TransactionManager {
    config: TransactionConfig,
    retry_stats: Mutex<HashMap<String, RetryStats>>,
}

impl TransactionManager {
    pub fn new(config: TransactionConfig) -> Self {
        Self {
            config,
            retry_stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Execute `operation`, retrying retryable store errors with
    /// exponential backoff. On exhaustion the last error surfaces wrapped
    /// with the recorded retry history.
    pub async fn execute<T, F, Fut>(&self, transaction_id: Option<&str>, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let tx_id = transaction_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut attempt: u32 = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            match operation().await {
                Ok(result) => {
                    self.retry_stats.lock().unwrap().remove(&tx_id);
                    return Ok(result);
                }
                Err(err) => {
                    attempt += 1;

                    if !err.is_retryable() {
                        error!(tx_id = %tx_id, error = %err, "non-retryable store error");
                        return Err(err);
                    }

                    self.record_attempt(&tx_id, &err);
                    warn!(
                        tx_id = %tx_id,
                        attempt,
                        retry_delay = delay,
                        error = %err,
                        "retryable store error"
                    );

                    if attempt >= self.config.max_retries {
                        return Err(self.exhausted(&tx_id, attempt, err));
                    }

                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    delay = (delay * self.config.backoff_factor).min(self.config.max_retry_delay);
                }
            }
        }
    }

    fn record_attempt(&self, tx_id: &str, err: &StoreError) {
        let now = Utc::now();
        let mut stats = self.retry_stats.lock().unwrap();
        let entry = stats.entry(tx_id.to_string()).or_insert_with(|| RetryStats {
            first_error_at: now,
            last_error_at: now,
            attempts: 0,
            error_codes: Vec::new(),
        });
        entry.attempts += 1;
        entry.last_error_at = now;
        if let Some(code) = err.code() {
            entry.error_codes.push(code.to_string());
        }
    }

    fn exhausted(&self, tx_id: &str, attempts: u32, err: StoreError) -> StoreError {
        let stats = self.retry_stats.lock().unwrap().remove(tx_id);
        let (first_error_at, error_codes) = stats
            .map(|s| (s.first_error_at, s.error_codes))
            .unwrap_or_else(|| (Utc::now(), Vec::new()));

        error!(tx_id = %tx_id, attempts, "retries exhausted");
        StoreError::RetriesExhausted {
            attempts,
            first_error_at,
            error_codes,
            source: Box::new(err),
        }
    }
}
