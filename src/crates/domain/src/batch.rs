//! Batch context tracking
//!
//! Each ingest batch gets a `BatchContext` used to attribute the keywords
//! it produced and to expose per-batch metrics.

use crate::error::{DomainError, Result};
use crate::types::ProcessingStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// State of one ingest batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchContext {
    pub batch_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Keyword ids produced while this batch was current
    pub keywords: HashSet<String>,
    pub status: ProcessingStatus,
    pub error: Option<String>,
}

impl BatchContext {
    pub fn new(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            start_time: Utc::now(),
            end_time: None,
            keywords: HashSet::new(),
            status: ProcessingStatus::InProgress,
            error: None,
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }
}

/// Per-batch metrics summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub batch_id: String,
    pub keyword_count: usize,
    pub status: ProcessingStatus,
    pub duration_seconds: Option<f64>,
}

/// Tracks batch lifecycles and keyword attribution
#[derive(Debug, Default)]
pub struct ProcessingContext {
    batches: HashMap<String, BatchContext>,
    current_batch_id: Option<String>,
}

impl ProcessingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new batch and make it current
    pub fn start_batch(&mut self, batch_id: &str) -> Result<()> {
        if self.batches.contains_key(batch_id) {
            return Err(DomainError::Batch(format!(
                "batch {batch_id} already exists"
            )));
        }
        self.batches
            .insert(batch_id.to_string(), BatchContext::new(batch_id));
        self.current_batch_id = Some(batch_id.to_string());
        debug!(batch_id, "started batch");
        Ok(())
    }

    /// End a batch, recording an error message if it failed
    pub fn end_batch(&mut self, batch_id: &str, error: Option<String>) -> Result<()> {
        let batch = self
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| DomainError::Batch(format!("unknown batch: {batch_id}")))?;

        batch.end_time = Some(Utc::now());
        if let Some(message) = error {
            batch.status = ProcessingStatus::Failed;
            batch.error = Some(message);
        } else {
            batch.status = ProcessingStatus::Completed;
        }

        if self.current_batch_id.as_deref() == Some(batch_id) {
            self.current_batch_id = None;
        }
        debug!(batch_id, status = ?batch.status, "ended batch");
        Ok(())
    }

    /// Attribute a produced keyword to the current batch
    pub fn register_keyword(&mut self, keyword_id: &str) -> Result<()> {
        let current = self
            .current_batch_id
            .clone()
            .ok_or_else(|| DomainError::Batch("no active batch".into()))?;
        self.register_keyword_in(&current, keyword_id)
    }

    /// Attribute a produced keyword to a specific batch; used when several
    /// batches are in flight concurrently
    pub fn register_keyword_in(&mut self, batch_id: &str, keyword_id: &str) -> Result<()> {
        let batch = self
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| DomainError::Batch(format!("unknown batch: {batch_id}")))?;
        batch.keywords.insert(keyword_id.to_string());
        Ok(())
    }

    pub fn batch(&self, batch_id: &str) -> Option<&BatchContext> {
        self.batches.get(batch_id)
    }

    pub fn current_batch(&self) -> Option<&BatchContext> {
        self.current_batch_id
            .as_ref()
            .and_then(|id| self.batches.get(id))
    }

    pub fn metrics(&self, batch_id: &str) -> Option<BatchMetrics> {
        self.batches.get(batch_id).map(|batch| BatchMetrics {
            batch_id: batch.batch_id.clone(),
            keyword_count: batch.keywords.len(),
            status: batch.status,
            duration_seconds: batch.duration_seconds(),
        })
    }
}
