//! Router setup and shared state for the serve surface.
//!
//! The whole pipeline sits behind one mutex: a single logical session,
//! one operation at a time. Handlers run pipeline work on the blocking
//! thread pool since crawling, embedding, and generation are synchronous.
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::api::handlers;
use crate::pipeline::Pipeline;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Mutex<Pipeline>>,
}

/// Serve the pipeline over HTTP until the process is stopped.
pub async fn serve(addr: &str, pipeline: Pipeline) -> Result<()> {
    let state = AppState {
        pipeline: Arc::new(Mutex::new(pipeline)),
    };

    let app = Router::new()
        .route("/", get(handlers::home))
        .route("/crawl", post(handlers::crawl))
        .route("/index", post(handlers::build_index))
        .route("/ask", post(handlers::ask))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .context("server terminated with an error")?;
    Ok(())
}
