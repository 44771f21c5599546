use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::monitor::{MonitorStatus, StatusSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub status: Arc<MonitorStatus>,
    pub metrics: PrometheusHandle,
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    #[serde(flatten)]
    monitor: StatusSnapshot,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        monitor: state.status.snapshot(),
    })
}

async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// Serve the router on `addr` until `shutdown` turns true.
pub async fn serve(
    addr: &str,
    state: AppState,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind http listener on {addr}"))?;
    tracing::info!(addr, "http surface listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("http server")
}
