// tests/api_http.rs
//
// HTTP-level tests for the operational Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /metrics

use std::sync::Arc;

use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use price_anomaly_monitor::api::{self, AppState};
use price_anomaly_monitor::monitor::MonitorStatus;
use price_anomaly_monitor::telemetry::Metrics;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router(state: AppState) -> Router {
    api::create_router(state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, String::from_utf8(bytes).expect("utf8"))
}

#[tokio::test]
async fn health_reports_monitor_status() {
    let state = AppState {
        status: Arc::new(MonitorStatus::default()),
        metrics: Metrics::detached().handle,
    };
    let (status, body) = get(test_router(state), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_str(&body).expect("json body");
    assert_eq!(v["status"], "ok");
    assert_eq!(v["cycles"], 0);
    assert_eq!(v["alerts_posted"], 0);
    assert!(v.get("last_cycle_ts").is_some());
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::with_local_recorder(&recorder, || {
        metrics::counter!("monitor_alerts_posted_total", "source" => "wb").increment(2);
    });

    let state = AppState {
        status: Arc::new(MonitorStatus::default()),
        metrics: handle,
    };
    let (status, body) = get(test_router(state), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("monitor_alerts_posted_total"), "body: {body}");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let state = AppState {
        status: Arc::new(MonitorStatus::default()),
        metrics: Metrics::detached().handle,
    };
    let (status, _) = get(test_router(state), "/decide").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
