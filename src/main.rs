//! Price anomaly monitor: binary entrypoint.
//! Loads configuration, starts the polling loop, the optional HTTP surface and
//! the Telegram `/start` responder, and stops them all on Ctrl-C.

use anyhow::Result;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use price_anomaly_monitor::api::{self, AppState};
use price_anomaly_monitor::telemetry::Metrics;
use price_anomaly_monitor::{build_monitor, MonitorConfig, TelegramNotifier};

/// Compact logs by default, JSON lines with LOG_FORMAT=json.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("price_anomaly_monitor=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = MonitorConfig::load()?;
    let metrics = Metrics::install()?;
    let monitor = build_monitor(&cfg)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if let Some(addr) = cfg.http_addr.clone() {
        let state = AppState {
            status: monitor.status(),
            metrics: metrics.handle.clone(),
        };
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api::serve(&addr, state, rx).await {
                tracing::error!(error = ?e, "http surface stopped");
            }
        }));
    }

    if let Some((token, channel)) = cfg.telegram() {
        let bot = TelegramNotifier::new(token, channel);
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { bot.run_command_listener(rx).await }));
    }

    tracing::info!(
        threshold = cfg.anomaly_drop_percent,
        min_history = cfg.need_history_min,
        data_dir = %cfg.data_dir.display(),
        "bot started, monitoring Wildberries + Yandex.Market"
    );
    let loop_task = tokio::spawn(monitor.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    loop_task.await?;
    for t in tasks {
        let _ = t.await;
    }
    Ok(())
}
