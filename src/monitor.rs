//! # Polling loop
//! One cycle = one query, every source in turn: fetch → decide → notify →
//! persist. Cycles never overlap, so the engine is owned here and needs no
//! locking. Shutdown is honoured between cycles and during the pause.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::watch;

use crate::engine::{Candidate, DecisionEngine};
use crate::ingest::fetch_samples;
use crate::ingest::types::{SampleSource, Source};
use crate::notify::{format_alert, Notifier};
use crate::telemetry as m;

/// Counters read by the HTTP surface while the loop runs.
#[derive(Debug, Default)]
pub struct MonitorStatus {
    cycles: AtomicU64,
    last_cycle_ts: AtomicI64,
    alerts_posted: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub cycles: u64,
    pub last_cycle_ts: i64,
    pub alerts_posted: u64,
}

impl MonitorStatus {
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            last_cycle_ts: self.last_cycle_ts.load(Ordering::Relaxed),
            alerts_posted: self.alerts_posted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: Source,
    /// `None` when the fetch failed or timed out and the batch was abandoned.
    pub fetched: Option<usize>,
    pub candidates: usize,
    pub posted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub query: String,
    pub sources: Vec<SourceReport>,
}

pub struct Monitor {
    engine: DecisionEngine,
    sources: Vec<Box<dyn SampleSource>>,
    notifier: Arc<dyn Notifier>,
    queries: Vec<String>,
    next_query: usize,
    page: u32,
    interval: Duration,
    status: Arc<MonitorStatus>,
}

impl Monitor {
    pub fn new(
        engine: DecisionEngine,
        sources: Vec<Box<dyn SampleSource>>,
        notifier: Arc<dyn Notifier>,
        queries: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            sources,
            notifier,
            queries,
            next_query: 0,
            page: 1,
            interval,
            status: Arc::new(MonitorStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<MonitorStatus> {
        self.status.clone()
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Round robin over the configured queries.
    pub fn next_query(&mut self) -> Option<String> {
        if self.queries.is_empty() {
            return None;
        }
        let q = self.queries[self.next_query % self.queries.len()].clone();
        self.next_query = self.next_query.wrapping_add(1);
        Some(q)
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let query = self.next_query().unwrap_or_default();
        let mut reports = Vec::with_capacity(self.sources.len());

        for provider in &self.sources {
            let report = run_source(
                &mut self.engine,
                provider.as_ref(),
                self.notifier.as_ref(),
                &query,
                self.page,
            )
            .await;
            self.status
                .alerts_posted
                .fetch_add(report.posted as u64, Ordering::Relaxed);
            reports.push(report);
        }

        let now = Utc::now().timestamp();
        self.status.cycles.fetch_add(1, Ordering::Relaxed);
        self.status.last_cycle_ts.store(now, Ordering::Relaxed);
        gauge!(m::LAST_CYCLE_TS).set(now as f64);

        CycleReport {
            query,
            sources: reports,
        }
    }

    /// Run cycles until `shutdown` turns true (or its sender goes away).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            sources = self.sources.len(),
            queries = self.queries.len(),
            interval_secs = self.interval.as_secs(),
            notifier = self.notifier.name(),
            "monitor loop started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.run_cycle().await;
            tracing::debug!(query = %report.query, "cycle done");

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        self.engine.flush_posts();
        tracing::info!("monitor loop stopped");
    }
}

async fn run_source(
    engine: &mut DecisionEngine,
    provider: &dyn SampleSource,
    notifier: &dyn Notifier,
    query: &str,
    page: u32,
) -> SourceReport {
    let source = provider.source();
    let mut report = SourceReport {
        source,
        fetched: None,
        candidates: 0,
        posted: 0,
        failed: 0,
    };

    tracing::info!(source = %source, query, "checking");
    let samples = match fetch_samples(provider, query, page).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(source = %source, error = ?e, "fetch failed, batch skipped");
            return report;
        }
    };
    report.fetched = Some(samples.len());

    let outcome = engine.process_batch(source, &samples);
    report.candidates = outcome.candidates.len();

    let (posted, failed) = deliver(engine, notifier, &outcome.candidates).await;
    report.posted = posted;
    report.failed = failed;

    tracing::debug!(
        source = %source,
        seen = outcome.summary.seen,
        warming = outcome.summary.warming,
        no_anomaly = outcome.summary.no_anomaly,
        duplicate = outcome.summary.duplicate,
        posted,
        failed,
        "batch processed"
    );
    report
}

/// Send every candidate; only successful sends advance the dedup gate.
/// Returns (posted, failed).
pub async fn deliver(
    engine: &mut DecisionEngine,
    notifier: &dyn Notifier,
    candidates: &[Candidate],
) -> (usize, usize) {
    let mut posted = 0usize;
    let mut failed = 0usize;

    for c in candidates {
        let text = format_alert(c);
        match notifier.send(&text).await {
            Ok(()) => {
                engine.mark_posted(c, Utc::now());
                posted += 1;
                counter!(m::POSTED_TOTAL, "source" => c.sample.source.slug()).increment(1);
                let short: String = c.sample.name.chars().take(50).collect();
                tracing::info!(
                    source = c.sample.source.label(),
                    name = %short,
                    price = c.sample.price,
                    drop_pct = c.drop_percent.trunc(),
                    "posted"
                );
            }
            Err(e) => {
                failed += 1;
                counter!(m::NOTIFY_ERRORS_TOTAL, "notifier" => notifier.name()).increment(1);
                tracing::warn!(key = %c.sample.alert_key, error = ?e, "notify failed, will retry next cycle");
            }
        }
    }

    if posted > 0 {
        engine.flush_posts();
    }
    (posted, failed)
}
