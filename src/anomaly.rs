//! anomaly.rs: "is this price anomalously low?"
//!
//! Pure business logic, no I/O. A drop is measured in percent against the
//! rolling average; it only counts once enough history has accumulated for
//! that average to mean something.

use serde::{Deserialize, Serialize};

/// Minimum drop from the average, in percent.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 70.0;
/// Minimum number of retained prices before a product is judged at all.
pub const DEFAULT_MIN_HISTORY: usize = 3;

/// Percentage by which `new_price` sits below `old_average`, never negative.
/// An absent, zero or negative baseline reports no drop.
pub fn percent_drop(old_average: Option<f64>, new_price: f64) -> f64 {
    match old_average {
        Some(avg) if avg > 0.0 => ((avg - new_price) / avg * 100.0).max(0.0),
        _ => 0.0,
    }
}

pub fn is_anomalous(
    history_len: usize,
    percent_drop: f64,
    min_history: usize,
    threshold_percent: f64,
) -> bool {
    history_len >= min_history && percent_drop >= threshold_percent
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyVerdict {
    /// Not enough history yet.
    Warming,
    NoAnomaly { drop_percent: f64 },
    Anomalous { drop_percent: f64 },
}

impl AnomalyVerdict {
    pub fn is_anomalous(&self) -> bool {
        matches!(self, AnomalyVerdict::Anomalous { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRule {
    pub threshold_percent: f64,
    pub min_history: usize,
}

impl Default for AnomalyRule {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            min_history: DEFAULT_MIN_HISTORY,
        }
    }
}

impl AnomalyRule {
    pub fn evaluate(&self, history_len: usize, average: Option<f64>, price: f64) -> AnomalyVerdict {
        if history_len < self.min_history {
            return AnomalyVerdict::Warming;
        }
        let drop_percent = percent_drop(average, price);
        if is_anomalous(history_len, drop_percent, self.min_history, self.threshold_percent) {
            AnomalyVerdict::Anomalous { drop_percent }
        } else {
            AnomalyVerdict::NoAnomaly { drop_percent }
        }
    }
}
