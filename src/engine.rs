//! # Decision Engine
//! Decides, for every observed `(product, price)` sample, whether to alert.
//!
//! Flow per sample: record the price → average → history gate → drop
//! threshold → dedup gate. Qualifying samples are returned as [`Candidate`]s;
//! the caller delivers them and reports success back through
//! [`DecisionEngine::mark_posted`], so the dedup gate only advances for alerts
//! that actually went out. Price history is persisted once per batch, post
//! records only when something was posted ([`DecisionEngine::flush_posts`]).

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::anomaly::{AnomalyRule, AnomalyVerdict};
use crate::gate::PostGate;
use crate::history::PriceHistoryStore;
use crate::ingest::types::{Sample, Source};
use crate::store::StateStore;
use crate::telemetry as m;

/// Which prices the baseline average is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMode {
    /// Average over the whole window, the just-recorded price included.
    #[default]
    IncludeLatest,
    /// Average over the prices observed before this one.
    ExcludeLatest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub rule: AnomalyRule,
    pub baseline: BaselineMode,
    pub price_memory: usize,
    pub repost_after_secs: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            rule: AnomalyRule::default(),
            baseline: BaselineMode::default(),
            price_memory: crate::rolling::DEFAULT_PRICE_MEMORY,
            repost_after_secs: crate::gate::DEFAULT_REPOST_AFTER_SECS,
        }
    }
}

/// A sample that passed every gate and should be announced.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub sample: Sample,
    pub average: f64,
    pub drop_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub seen: usize,
    pub warming: usize,
    pub no_anomaly: usize,
    pub duplicate: usize,
    pub candidates: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub candidates: Vec<Candidate>,
    pub summary: BatchSummary,
}

pub struct DecisionEngine {
    history: PriceHistoryStore,
    gate: PostGate,
    rule: AnomalyRule,
    baseline: BaselineMode,
    posts_dirty: bool,
}

impl DecisionEngine {
    /// Load both stores through the same persistence port.
    pub fn open(port: Arc<dyn StateStore>, settings: &EngineSettings) -> Self {
        let history = PriceHistoryStore::open(port.clone(), settings.price_memory);
        let gate = PostGate::open(port, settings.repost_after_secs);
        Self::new(history, gate, settings)
    }

    pub fn new(history: PriceHistoryStore, gate: PostGate, settings: &EngineSettings) -> Self {
        Self {
            history,
            gate,
            rule: settings.rule,
            baseline: settings.baseline,
            posts_dirty: false,
        }
    }

    pub fn history(&self) -> &PriceHistoryStore {
        &self.history
    }

    pub fn gate(&self) -> &PostGate {
        &self.gate
    }

    pub fn process_batch(&mut self, source: Source, samples: &[Sample]) -> BatchOutcome {
        self.process_batch_at(source, samples, Utc::now())
    }

    /// Same as [`Self::process_batch`] with an explicit clock.
    pub fn process_batch_at(
        &mut self,
        source: Source,
        samples: &[Sample],
        now: DateTime<Utc>,
    ) -> BatchOutcome {
        let mut out = BatchOutcome::default();
        let mut emitted: BTreeSet<&str> = BTreeSet::new();

        for sample in samples {
            if sample.source != source {
                tracing::debug!(key = %sample.alert_key, batch = %source, "sample from another source skipped");
                continue;
            }
            out.summary.seen += 1;

            self.history.record_price(source, &sample.product_id, sample.price);
            let len = self.history.history_len(source, &sample.product_id);
            let average = self.baseline(source, &sample.product_id);

            let drop_percent = match self.rule.evaluate(len, average, sample.price) {
                AnomalyVerdict::Warming => {
                    out.summary.warming += 1;
                    continue;
                }
                AnomalyVerdict::NoAnomaly { .. } => {
                    out.summary.no_anomaly += 1;
                    continue;
                }
                AnomalyVerdict::Anomalous { drop_percent } => drop_percent,
            };

            // one alert per product per batch; the gate only learns of it after delivery
            if emitted.contains(sample.alert_key.as_str())
                || !self.gate.may_post(&sample.alert_key, sample.price, now)
            {
                tracing::debug!(key = %sample.alert_key, price = sample.price, "suppressed duplicate");
                out.summary.duplicate += 1;
                continue;
            }

            tracing::info!(
                key = %sample.alert_key,
                price = sample.price,
                drop_pct = drop_percent,
                "anomalous price"
            );
            emitted.insert(sample.alert_key.as_str());
            out.candidates.push(Candidate {
                sample: sample.clone(),
                average: average.unwrap_or_default(),
                drop_percent,
            });
        }
        out.summary.candidates = out.candidates.len();

        let label = source.slug();
        counter!(m::SAMPLES_TOTAL, "source" => label).increment(out.summary.seen as u64);
        counter!(m::SUPPRESSED_TOTAL, "source" => label, "reason" => "warming")
            .increment(out.summary.warming as u64);
        counter!(m::SUPPRESSED_TOTAL, "source" => label, "reason" => "no_anomaly")
            .increment(out.summary.no_anomaly as u64);
        counter!(m::SUPPRESSED_TOTAL, "source" => label, "reason" => "duplicate")
            .increment(out.summary.duplicate as u64);
        counter!(m::CANDIDATES_TOTAL, "source" => label).increment(out.summary.candidates as u64);

        if let Err(e) = self.history.persist(source) {
            tracing::error!(source = %source, error = ?e, "price history NOT persisted");
            counter!(m::PERSIST_ERRORS_TOTAL, "document" => "prices").increment(1);
        }

        out
    }

    /// Record a successful delivery of `candidate`.
    pub fn mark_posted(&mut self, candidate: &Candidate, now: DateTime<Utc>) {
        self.gate
            .mark_posted(&candidate.sample.alert_key, candidate.sample.price, now);
        self.posts_dirty = true;
    }

    /// Persist post records if anything was posted since the last flush.
    /// Returns whether a write happened; failed writes are retried next flush.
    pub fn flush_posts(&mut self) -> bool {
        if !self.posts_dirty {
            return false;
        }
        match self.gate.persist() {
            Ok(()) => {
                self.posts_dirty = false;
                true
            }
            Err(e) => {
                tracing::error!(error = ?e, "post records NOT persisted");
                counter!(m::PERSIST_ERRORS_TOTAL, "document" => "history").increment(1);
                false
            }
        }
    }

    fn baseline(&self, source: Source, product_id: &str) -> Option<f64> {
        match self.baseline {
            BaselineMode::IncludeLatest => self.history.average_price(source, product_id),
            BaselineMode::ExcludeLatest => self
                .history
                .series(source, product_id)?
                .average_before_latest(),
        }
    }
}
