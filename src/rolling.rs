//! # Rolling Window
//! Count-bounded sliding window over observed prices (default 50 samples).
//!
//! Newest prices are appended at the back; once the window is full the
//! oldest entries fall off the front, so the series always holds the most
//! recent `capacity` observations. Serialized as a plain JSON array.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of prices kept per product.
pub const DEFAULT_PRICE_MEMORY: usize = 50;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSeries {
    /// Oldest first.
    buf: VecDeque<f64>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `price` and evict from the front until at most `capacity` remain.
    pub fn record(&mut self, price: f64, capacity: usize) {
        self.buf.push_back(price);
        self.truncate(capacity);
    }

    /// Drop the oldest entries so at most `capacity` remain.
    pub fn truncate(&mut self, capacity: usize) {
        let cap = capacity.max(1);
        while self.buf.len() > cap {
            self.buf.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Arithmetic mean; `None` when there is nothing to average.
    pub fn average(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.buf.iter().sum::<f64>() / self.buf.len() as f64)
    }

    /// Mean of everything except the newest entry.
    pub fn average_before_latest(&self) -> Option<f64> {
        let n = self.buf.len().checked_sub(1)?;
        if n == 0 {
            return None;
        }
        Some(self.buf.iter().take(n).sum::<f64>() / n as f64)
    }

    pub fn latest(&self) -> Option<f64> {
        self.buf.back().copied()
    }

    pub fn oldest(&self) -> Option<f64> {
        self.buf.front().copied()
    }

    /// Remove entries a price can never legitimately be (NaN, inf, <= 0).
    pub(crate) fn retain_valid(&mut self) {
        self.buf.retain(|p| p.is_finite() && *p > 0.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.buf.iter().copied()
    }
}
