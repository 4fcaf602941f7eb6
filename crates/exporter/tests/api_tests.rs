//! Integration tests for the exporter API endpoints
//!
//! The registry is fed directly through the parser here; no tracing engine
//! is attached, which is also what proves the endpoint serves last-known
//! state independent of source liveness.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use exporter_lib::{
    exposition, health::components, parser, ComponentStatus, ExporterMetrics, HealthRegistry,
    MetricRegistry,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tower::ServiceExt;

const SAMPLE_LINE: &str = r#"host_pid="100" container_id="abc123" cgroup_path="docker/abc123" command="java" oc_totalpages="1000" oc_chosen_points="950""#;

#[derive(Clone)]
struct AppState {
    registry: Arc<MetricRegistry>,
    health: HealthRegistry,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let mut body = exposition::render(&snapshot).unwrap().into_bytes();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut body)
        .unwrap();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        body,
    )
}

fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health = HealthRegistry::new();
    health.register(components::SOURCE).await;
    health.register(components::SERVER).await;

    let state = Arc::new(AppState {
        registry: Arc::new(MetricRegistry::new()),
        health,
    });
    let router = create_test_router(state.clone());

    (router, state)
}

async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn has_series(text: &str, name: &str, labels: &[(&str, &str)], value: &str) -> bool {
    text.lines()
        .filter(|line| line.starts_with(&format!("{name}{{")))
        .any(|line| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!(r#"{k}="{v}""#)))
                && line.ends_with(&format!(" {value}"))
        })
}

fn series_value(text: &str, name: &str, labels: &[(&str, &str)]) -> Option<i64> {
    text.lines()
        .filter(|line| line.starts_with(&format!("{name}{{")))
        .find(|line| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!(r#"{k}="{v}""#)))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

#[tokio::test]
async fn test_metrics_serves_observed_kill() {
    let (app, state) = setup_test_app().await;
    state.registry.observe(parser::parse(SAMPLE_LINE).unwrap());

    let (status, text) = get_body(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let labels = [("container_id", "abc123"), ("command", "java")];
    assert!(has_series(&text, "oom_kills_total", &labels, "1"));
    assert!(has_series(&text, "oom_kill_last_badness_points", &labels, "950"));
    assert!(has_series(&text, "oom_kill_last_totalpages", &labels, "1000"));

    // the record carried no ts field, so the event was stamped at parse time
    let ts = series_value(&text, "oom_kill_last_timestamp_seconds", &labels).unwrap();
    let now = chrono::Utc::now().timestamp();
    assert!(ts > 0 && ts <= now + 1);
}

#[tokio::test]
async fn test_metrics_counts_repeat_kills() {
    let (app, state) = setup_test_app().await;
    for _ in 0..3 {
        state.registry.observe(parser::parse(SAMPLE_LINE).unwrap());
    }

    let (_, text) = get_body(app, "/metrics").await;
    let labels = [("container_id", "abc123"), ("command", "java")];
    assert!(has_series(&text, "oom_kills_total", &labels, "3"));
}

#[tokio::test]
async fn test_metrics_distinct_commands_same_container() {
    let (app, state) = setup_test_app().await;
    for command in ["java", "python"] {
        let line = format!(
            r#"host_pid="1" container_id="abc123" command="{command}" oc_totalpages="10" oc_chosen_points="20""#
        );
        state.registry.observe(parser::parse(&line).unwrap());
    }

    let (_, text) = get_body(app, "/metrics").await;
    for command in ["java", "python"] {
        let labels = [("container_id", "abc123"), ("command", command)];
        assert!(has_series(&text, "oom_kills_total", &labels, "1"));
    }
}

#[tokio::test]
async fn test_metrics_serves_without_any_source() {
    // no engine attached at all - endpoint still answers
    let (app, _state) = setup_test_app().await;

    let (status, _text) = get_body(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_includes_exporter_self_metrics() {
    let (app, _state) = setup_test_app().await;
    let metrics = ExporterMetrics::new();
    metrics.inc_lines();

    let (_, text) = get_body(app, "/metrics").await;
    assert!(text.contains("oomkill_exporter_lines_total"));
}

#[tokio::test]
async fn test_metrics_content_type() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));
}

#[tokio::test]
async fn test_healthz_degraded_source_still_operational() {
    let (app, state) = setup_test_app().await;
    state
        .health
        .set_degraded(components::SOURCE, "restarting, attempt 1")
        .await;

    let (status, body) = get_body(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;
    state
        .health
        .set_unhealthy(components::SOURCE, "engine binary missing")
        .await;

    let (status, body) = get_body(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
    assert!(health["components"]["source"].is_object());
}

#[tokio::test]
async fn test_readyz_not_ready_until_initialized() {
    let (app, state) = setup_test_app().await;

    let (status, _) = get_body(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health.set_ready(true).await;
    let (status, body) = get_body(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let readiness: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}
