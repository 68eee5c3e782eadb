//! # HTTP Server
//!
//! HTTP server for metrics, health checks, and Kubernetes probes.
//!
//! Provides endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 when controller is ready)
//! - `/status` - Status of every sync object as JSON
//!
//! The server runs on port 5000 by default (configurable via `METRICS_PORT` environment variable).

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::controller::scheduler::SchedulerHandle;

#[derive(Debug)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
    pub scheduler: SchedulerHandle,
}

/// Serve until `shutdown` resolves
///
/// # Errors
/// Fails when the port cannot be bound or the server stops with an error.
pub async fn start_server(
    port: u16,
    state: Arc<ServerState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), anyhow::Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

fn gather() -> Vec<prometheus::proto::MetricFamily> {
    use crate::observability::metrics::REGISTRY;
    REGISTRY.gather()
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.scheduler.statuses().await {
        Ok(statuses) => {
            // JSON object keys must be strings.
            let statuses: std::collections::BTreeMap<String, _> = statuses
                .into_iter()
                .map(|(key, status)| (key.to_string(), status))
                .collect();
            (StatusCode::OK, Json(statuses)).into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(ready: bool) -> (Arc<ServerState>, crate::controller::scheduler::Scheduler) {
        let (scheduler, handle) = crate::controller::scheduler::Scheduler::new(
            crate::controller::scheduler::SchedulerConfig::default(),
            Arc::new(crate::provider::ProviderRegistry::new()),
            Arc::new(crate::provider::resolver::StaticCredentialResolver::new()),
            Arc::new(crate::controller::sink::LogSink),
            Arc::new(crate::controller::health::HealthCache::new(
                std::time::Duration::from_secs(60),
            )),
            Arc::new(crate::controller::catalog::StoreCatalog::default()),
        );
        let state = Arc::new(ServerState {
            is_ready: Arc::new(AtomicBool::new(ready)),
            scheduler: handle,
        });
        (state, scheduler)
    }

    async fn get(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_probes() {
        let (ready, _scheduler) = state(true);
        assert_eq!(get(router(ready), "/healthz").await, StatusCode::OK);
        let (ready, _scheduler) = state(true);
        assert_eq!(get(router(ready), "/readyz").await, StatusCode::OK);
        let (not_ready, _scheduler) = state(false);
        assert_eq!(
            get(router(not_ready), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_status_unavailable_without_scheduler() {
        let (state, scheduler) = state(true);
        drop(scheduler);
        assert_eq!(
            get(router(state), "/status").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
