//! Metrics and health exposition.
//!
//! A minimal HTTP surface: `/metrics` in Prometheus text format and a
//! `/healthz` liveness probe.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tokio::sync::broadcast;
use tracing::info;

use crate::infrastructure::metrics::Metrics;

pub async fn serve(
    listen_addr: String,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind web listener on {listen_addr}"))?;
    info!(%listen_addr, "web server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .context("web server failed")
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Result<String, StatusCode> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metrics.registry().gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_endpoint_renders_counters() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.scale_event.inc();

        let body = metrics_handler(State(metrics)).await.unwrap();
        assert!(body.contains("nightshift_scale_event 1"));
    }
}
