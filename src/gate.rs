// src/gate.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{load_or_default, save_json, StateStore};

pub const POST_RECORDS_DOCUMENT: &str = "history";
pub const DEFAULT_REPOST_AFTER_SECS: i64 = 24 * 3600;

/// Prices closer than this are the same price.
const PRICE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub last_price: f64,
    /// Unix seconds of the last post; `0` means never posted.
    pub last_post_ts: i64,
}

/// Dedup gate for alerts, keyed by alert key.
/// - First evaluation of a key always passes (and creates its record).
/// - Same price inside the cooldown is suppressed.
/// - A different price passes even inside the cooldown.
/// - State only advances via `mark_posted`, after a successful send.
pub struct PostGate {
    port: Arc<dyn StateStore>,
    cooldown: ChronoDuration,
    records: BTreeMap<String, PostRecord>,
}

impl PostGate {
    /// `cooldown_secs` < 0 is treated as 0 (no cooldown).
    pub fn open(port: Arc<dyn StateStore>, cooldown_secs: i64) -> Self {
        let records: BTreeMap<String, PostRecord> =
            load_or_default(port.as_ref(), POST_RECORDS_DOCUMENT);
        tracing::debug!(records = records.len(), "post records loaded");
        Self {
            port,
            cooldown: ChronoDuration::seconds(cooldown_secs.max(0)),
            records,
        }
    }

    pub fn may_post(&mut self, alert_key: &str, candidate_price: f64, now: DateTime<Utc>) -> bool {
        let Some(rec) = self.records.get(alert_key) else {
            self.records.insert(
                alert_key.to_string(),
                PostRecord {
                    last_price: candidate_price,
                    last_post_ts: 0,
                },
            );
            return true;
        };

        let same_price = (rec.last_price - candidate_price).abs() < PRICE_EPSILON;
        let since_post = now.timestamp().saturating_sub(rec.last_post_ts);
        !(same_price && since_post < self.cooldown.num_seconds())
    }

    pub fn mark_posted(&mut self, alert_key: &str, price: f64, now: DateTime<Utc>) {
        self.records.insert(
            alert_key.to_string(),
            PostRecord {
                last_price: price,
                last_post_ts: now.timestamp(),
            },
        );
    }

    pub fn record(&self, alert_key: &str) -> Option<&PostRecord> {
        self.records.get(alert_key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn persist(&self) -> Result<()> {
        save_json(self.port.as_ref(), POST_RECORDS_DOCUMENT, &self.records)
            .context("persist post records")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn gate() -> PostGate {
        PostGate::open(Arc::new(MemoryStore::new()), DEFAULT_REPOST_AFTER_SECS)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn first_evaluation_passes_and_creates_record() {
        let mut g = gate();
        assert!(g.may_post("wb:1", 99.0, t0()));
        assert_eq!(
            g.record("wb:1"),
            Some(&PostRecord {
                last_price: 99.0,
                last_post_ts: 0
            })
        );
    }

    #[test]
    fn same_price_inside_cooldown_blocked() {
        let mut g = gate();
        assert!(g.may_post("wb:1", 99.0, t0()));
        g.mark_posted("wb:1", 99.0, t0());
        let t1 = t0() + ChronoDuration::seconds(120);
        assert!(!g.may_post("wb:1", 99.0, t1));
        // within epsilon is still "the same"
        assert!(!g.may_post("wb:1", 99.000_000_1, t1));
    }

    #[test]
    fn different_price_inside_cooldown_passes() {
        let mut g = gate();
        g.mark_posted("wb:1", 99.0, t0());
        let t1 = t0() + ChronoDuration::seconds(60);
        assert!(g.may_post("wb:1", 89.0, t1));
    }

    #[test]
    fn same_price_after_cooldown_passes() {
        let mut g = gate();
        g.mark_posted("wb:1", 99.0, t0());
        let t_after = t0() + ChronoDuration::seconds(DEFAULT_REPOST_AFTER_SECS);
        assert!(g.may_post("wb:1", 99.0, t_after));
    }

    #[test]
    fn never_posted_record_passes_again() {
        let mut g = gate();
        assert!(g.may_post("ym:x", 10.0, t0()));
        // record exists with ts 0: the epoch is far outside any cooldown
        assert!(g.may_post("ym:x", 10.0, t0()));
    }

    #[test]
    fn persisted_records_survive_reopen() {
        let mem = Arc::new(MemoryStore::new());
        let mut g = PostGate::open(mem.clone(), 3600);
        g.mark_posted("wb:7", 150.0, t0());
        g.persist().unwrap();

        let raw = String::from_utf8(mem.get(POST_RECORDS_DOCUMENT).unwrap()).unwrap();
        assert!(raw.contains("\"last_post_ts\""));

        let mut g2 = PostGate::open(mem, 3600);
        assert!(!g2.may_post("wb:7", 150.0, t0() + ChronoDuration::seconds(10)));
    }
}
