//! Route definitions and handlers

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{AnalyzeRequest, AnalyzeResponse, HealthResponse, StatusResponse};
use crate::service::PipelineService;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use weaver_store::GraphConnection;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PipelineService>,
    pub store: Arc<GraphConnection>,
}

/// Build the API router
pub fn create_router(service: Arc<PipelineService>, store: Arc<GraphConnection>) -> Router {
    let state = AppState { service, store };

    Router::new()
        .route("/health", get(health))
        .route("/analysis/analyze", post(analyze))
        .route("/analysis/analyze/batch", post(analyze_batch))
        .route("/analysis/status/:task_id", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /analysis/analyze
async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if request.url.is_empty() {
        return Err(ApiError::BadRequest("url is required".into()));
    }

    let receipt = state
        .service
        .enqueue_urls(vec![request.into_item()])
        .await?;
    tracing::info!(task_id = %receipt.task_id, "accepted analysis request");

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            task_id: receipt.task_id,
            status: "enqueued".to_string(),
            progress: 0.0,
            message: format!("{} url(s) enqueued", receipt.urls_enqueued),
        }),
    ))
}

/// POST /analysis/analyze/batch, accepting a bare array of submissions
async fn analyze_batch(
    State(state): State<AppState>,
    Json(requests): Json<Vec<AnalyzeRequest>>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if requests.is_empty() {
        return Err(ApiError::BadRequest("urls must not be empty".into()));
    }
    if requests.iter().any(|r| r.url.is_empty()) {
        return Err(ApiError::BadRequest("every entry needs a url".into()));
    }

    let items = requests
        .into_iter()
        .map(AnalyzeRequest::into_item)
        .collect();
    let receipt = state.service.enqueue_urls(items).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            task_id: receipt.task_id,
            status: "enqueued".to_string(),
            progress: 0.0,
            message: format!("{} url(s) enqueued", receipt.urls_enqueued),
        }),
    ))
}

/// GET /analysis/status/{task_id}
async fn status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let report = state.service.get_status(&task_id).await?;
    Ok(Json(report.into()))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        queue_depth: state.service.queue_depth(),
        in_flight: state.service.in_flight().await,
        pool: state.store.check_pool().to_json(),
    })
}
