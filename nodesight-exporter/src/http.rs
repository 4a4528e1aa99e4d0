//! HTTP server for the metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use nodesight_common::Engine;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::exposition::{CONTENT_TYPE, render};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Create the HTTP router.
pub fn create_router(engine: Arc<Engine>, metrics_path: &str) -> Router {
    let state = AppState { engine };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs one scrape cycle per request.
///
/// A cycle that hit its deadline still returns what it gathered,
/// with `504 Gateway Timeout` so the scraper records the failure.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let report = state.engine.run_cycle().await;
    let body = render(&report.samples);

    let status = if report.timed_out {
        warn!(
            failed = report.failed().count(),
            "Scrape cycle timed out, serving partial results"
        );
        StatusCode::GATEWAY_TIMEOUT
    } else {
        debug!(
            samples = report.samples.len(),
            succeeded = report.succeeded_count(),
            "Scrape served"
        );
        StatusCode::OK
    };

    (status, [("content-type", CONTENT_TYPE)], body).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// HTTP server configuration.
pub struct HttpServer {
    engine: Arc<Engine>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(engine: Arc<Engine>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            engine,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until the shutdown signal is received.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let router = create_router(self.engine, &self.metrics_path);
        let addr = listener.local_addr()?;

        info!(
            addr = %addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
