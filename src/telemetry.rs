use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const SAMPLES_TOTAL: &str = "monitor_samples_total";
pub const REJECTED_SAMPLES_TOTAL: &str = "monitor_rejected_samples_total";
pub const SUPPRESSED_TOTAL: &str = "monitor_suppressed_total";
pub const CANDIDATES_TOTAL: &str = "monitor_candidates_total";
pub const POSTED_TOTAL: &str = "monitor_alerts_posted_total";
pub const NOTIFY_ERRORS_TOTAL: &str = "monitor_notify_errors_total";
pub const FETCH_ERRORS_TOTAL: &str = "monitor_fetch_errors_total";
pub const PERSIST_ERRORS_TOTAL: &str = "monitor_persist_errors_total";
pub const FETCH_MS: &str = "monitor_fetch_ms";
pub const LAST_CYCLE_TS: &str = "monitor_last_cycle_ts";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(SAMPLES_TOTAL, "Valid samples handed to the decision engine.");
        describe_counter!(
            REJECTED_SAMPLES_TOTAL,
            "Samples discarded at the boundary (bad price or id)."
        );
        describe_counter!(
            SUPPRESSED_TOTAL,
            "Samples not alerted, labelled by reason (warming, no_anomaly, duplicate)."
        );
        describe_counter!(CANDIDATES_TOTAL, "Samples that qualified for an alert.");
        describe_counter!(POSTED_TOTAL, "Alerts delivered to the notifier.");
        describe_counter!(NOTIFY_ERRORS_TOTAL, "Failed alert deliveries.");
        describe_counter!(FETCH_ERRORS_TOTAL, "Marketplace fetch errors and timeouts.");
        describe_counter!(
            PERSIST_ERRORS_TOTAL,
            "Failed writes of price history or post records."
        );
        describe_histogram!(FETCH_MS, "Marketplace fetch time in milliseconds.");
        describe_gauge!(LAST_CYCLE_TS, "Unix ts when the polling loop last finished a cycle.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// A handle backed by a private recorder; nothing global is touched.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }
}
