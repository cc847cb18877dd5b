//! Request handlers and wire types for the serve surface.
use std::sync::PoisonError;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::api::server::AppState;
use crate::crawler::CrawlLimits;
use crate::pipeline::{AskReply, CrawlReport, IndexReport, PipelineError};

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub start_url: String,
    pub max_pages: Option<usize>,
    pub max_depth: Option<usize>,
    pub crawl_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IndexRequest {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub top_k: Option<usize>,
}

// ── Error mapping ────────────────────────────────────────────────────

/// Wire form of a failed call: `{"error": msg}` with a matching status.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Chunking(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Crawler(crate::crawler::CrawlerError::InvalidSeed { .. })
            | PipelineError::Crawler(crate::crawler::CrawlerError::SeedWithoutHost(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

pub async fn home() -> Json<serde_json::Value> {
    Json(json!({ "message": "webrag is running" }))
}

pub async fn crawl(
    State(state): State<AppState>,
    Json(req): Json<CrawlRequest>,
) -> Result<Json<CrawlReport>, ApiError> {
    let report = run_blocking(state, move |pipeline| {
        let defaults = pipeline.config().crawler.clone();
        let limits = CrawlLimits {
            max_pages: req.max_pages.unwrap_or(defaults.max_pages),
            max_depth: req.max_depth.unwrap_or(defaults.max_depth),
            crawl_delay: Duration::from_millis(
                req.crawl_delay_ms.unwrap_or(defaults.crawl_delay_ms),
            ),
        };
        pipeline.crawl(&req.start_url, &limits)
    })
    .await?;
    Ok(Json(report))
}

pub async fn build_index(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexReport>, ApiError> {
    let report = run_blocking(state, move |pipeline| {
        let defaults = pipeline.config().indexing.clone();
        pipeline.build_index(
            req.chunk_size.unwrap_or(defaults.chunk_size),
            req.chunk_overlap.unwrap_or(defaults.chunk_overlap),
        )
    })
    .await?;
    Ok(Json(report))
}

pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskReply>, ApiError> {
    let reply = run_blocking(state, move |pipeline| {
        let top_k = req.top_k.unwrap_or(pipeline.config().retrieval.top_k);
        pipeline.ask(&req.question, top_k)
    })
    .await?;
    Ok(Json(reply))
}

/// Run a pipeline operation on the blocking pool under the session mutex.
async fn run_blocking<T, F>(state: AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut crate::pipeline::Pipeline) -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut pipeline = state
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        op(&mut pipeline).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal(format!("pipeline task panicked: {e}")))?
}
