//! API request and response payloads

use crate::service::{EnqueueItem, TaskStatusReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weaver_domain::BrowserContext;

/// Single-URL analysis request
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub tab_id: Option<String>,
    #[serde(default)]
    pub window_id: Option<String>,
    #[serde(default)]
    pub bookmark_id: Option<String>,
}

impl AnalyzeRequest {
    pub fn into_item(self) -> EnqueueItem {
        EnqueueItem {
            url: self.url,
            context: self.context.as_deref().and_then(BrowserContext::parse),
            tab_id: self.tab_id,
            window_id: self.window_id,
            bookmark_id: self.bookmark_id,
        }
    }
}

/// Accepted-submission response
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub task_id: String,
    pub status: String,
    pub progress: f64,
    pub message: String,
}

/// Task status response
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub progress: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<TaskStatusReport> for StatusResponse {
    fn from(report: TaskStatusReport) -> Self {
        Self {
            status: report.status.as_str().to_string(),
            progress: report.progress,
            message: report.message,
            started_at: report.started_at,
            completed_at: report.completed_at,
            error: report.error,
        }
    }
}

/// Health summary
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub queue_depth: usize,
    pub in_flight: usize,
    pub pool: serde_json::Value,
}
