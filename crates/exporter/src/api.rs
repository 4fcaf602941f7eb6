//! HTTP surface: Prometheus exposition and health probes

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use exporter_lib::{exposition, ComponentStatus, HealthRegistry, MetricRegistry};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MetricRegistry>,
    pub health: HealthRegistry,
}

impl AppState {
    pub fn new(registry: Arc<MetricRegistry>, health: HealthRegistry) -> Self {
        Self { registry, health }
    }
}

/// Health check response - returns 200 if healthy/degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint: the event registry snapshot plus the
/// exporter's own self-metrics. Reads only; a stalled tracing engine still
/// yields the last-known state here.
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.registry.snapshot();
    let mut body = match exposition::render(&snapshot) {
        Ok(text) => text.into_bytes(),
        Err(e) => {
            error!(error = %e, "failed to render metrics snapshot");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut body) {
        error!(error = %e, "failed to encode exporter self-metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server; finishes in-flight requests on shutdown, then
/// closes the listener.
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "starting metrics server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    info!("metrics server stopped");
    Ok(())
}
