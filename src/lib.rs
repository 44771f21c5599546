// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod anomaly;
pub mod api;
pub mod config;
pub mod engine;
pub mod gate;
pub mod history;
pub mod monitor;
pub mod rolling;
pub mod store;
pub mod telemetry;

// Marketplace fetchers and notification transport
pub mod ingest;
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::config::MonitorConfig;
pub use crate::engine::{BaselineMode, Candidate, DecisionEngine, EngineSettings};
pub use crate::ingest::types::{Sample, SampleSource, Source};
pub use crate::notify::{LogNotifier, Notifier, TelegramNotifier};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::ingest::providers::{WildberriesSource, YandexMarketSource};
use crate::monitor::Monitor;
use crate::store::JsonFileStore;

/// Wire stores, engine, fetchers and notifier from `cfg`.
pub fn build_monitor(cfg: &MonitorConfig) -> Result<Monitor> {
    let port = Arc::new(JsonFileStore::open(&cfg.data_dir)?);
    let engine = DecisionEngine::open(port, &cfg.engine_settings());

    let sources: Vec<Box<dyn SampleSource>> = vec![
        Box::new(WildberriesSource::new(Duration::from_secs(cfg.wb_timeout_secs))?),
        Box::new(YandexMarketSource::new(Duration::from_secs(cfg.ym_timeout_secs))?),
    ];

    let notifier: Arc<dyn Notifier> = match cfg.telegram() {
        Some((token, channel)) => Arc::new(TelegramNotifier::new(token, channel)),
        None => {
            tracing::warn!("TELEGRAM_TOKEN / CHANNEL_ID not set, alerts go to the log only");
            Arc::new(LogNotifier)
        }
    };

    Ok(Monitor::new(
        engine,
        sources,
        notifier,
        cfg.queries.clone(),
        cfg.check_interval(),
    ))
}
