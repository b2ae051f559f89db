//! Scrape endpoint.
//!
//! Serves the exporter's registry at a single configurable path. Every other
//! path answers `404`.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::exporter::SharedExporter;

#[derive(Clone)]
struct ScrapeState {
    exporter: SharedExporter,
}

/// Content type of the text exposition format.
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

fn create_router(exporter: SharedExporter, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(scrape))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(ScrapeState { exporter })
}

async fn scrape(State(state): State<ScrapeState>) -> Response {
    let body = state.exporter.metrics();
    debug!(bytes = body.len(), "Serving scrape");

    ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404").into_response()
}

/// Serves the scrape endpoint of one exporter.
pub struct HttpServer {
    exporter: SharedExporter,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    pub fn new(exporter: SharedExporter, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            exporter,
            listen_addr,
            metrics_path,
        }
    }

    /// Bind and serve until `shutdown` turns `true`, then drain open requests.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.exporter, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Cannot bind scrape endpoint on {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "Scrape endpoint listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stopped| *stopped).await;
                info!("Scrape endpoint shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("Scrape endpoint failed: {}", e))?;

        info!("Scrape endpoint stopped");
        Ok(())
    }
}
