//! history.rs: per-source price history with a rolling average per product.
//!
//! One JSON document per marketplace (`prices_wb`, `prices_ym`), each a flat
//! map `product id -> [prices, oldest first]`. Loaded once on construction,
//! written back explicitly via [`PriceHistoryStore::persist`].

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::ingest::types::Source;
use crate::rolling::PriceSeries;
use crate::store::{load_or_default, save_json, StateStore};

/// BTreeMap keeps the document key order stable across writes.
type SeriesMap = BTreeMap<String, PriceSeries>;

pub struct PriceHistoryStore {
    port: Arc<dyn StateStore>,
    capacity: usize,
    by_source: BTreeMap<Source, SeriesMap>,
}

impl PriceHistoryStore {
    /// Load every source's document through `port`, keeping at most
    /// `capacity` prices per product.
    pub fn open(port: Arc<dyn StateStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut by_source = BTreeMap::new();
        for source in Source::ALL {
            let mut map: SeriesMap = load_or_default(port.as_ref(), &document_name(source));
            for series in map.values_mut() {
                series.retain_valid();
                series.truncate(capacity);
            }
            map.retain(|_, s| !s.is_empty());
            tracing::debug!(source = %source, products = map.len(), "price history loaded");
            by_source.insert(source, map);
        }
        Self {
            port,
            capacity,
            by_source,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `price` to the series for `(source, product_id)`.
    pub fn record_price(&mut self, source: Source, product_id: &str, price: f64) {
        let cap = self.capacity;
        self.by_source
            .entry(source)
            .or_default()
            .entry(product_id.to_string())
            .or_default()
            .record(price, cap);
    }

    pub fn history_len(&self, source: Source, product_id: &str) -> usize {
        self.series(source, product_id).map_or(0, PriceSeries::len)
    }

    pub fn average_price(&self, source: Source, product_id: &str) -> Option<f64> {
        self.series(source, product_id)?.average()
    }

    pub fn series(&self, source: Source, product_id: &str) -> Option<&PriceSeries> {
        self.by_source.get(&source)?.get(product_id)
    }

    /// Number of products with at least one recorded price.
    pub fn product_count(&self, source: Source) -> usize {
        self.by_source.get(&source).map_or(0, BTreeMap::len)
    }

    /// Write the full document for `source`, replacing the previous one.
    pub fn persist(&self, source: Source) -> Result<()> {
        let empty = SeriesMap::new();
        let map = self.by_source.get(&source).unwrap_or(&empty);
        save_json(self.port.as_ref(), &document_name(source), map)
            .with_context(|| format!("persist price history for {source}"))
    }
}

pub fn document_name(source: Source) -> String {
    format!("prices_{}", source.slug())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> (Arc<MemoryStore>, PriceHistoryStore) {
        let mem = Arc::new(MemoryStore::new());
        let hist = PriceHistoryStore::open(mem.clone(), 3);
        (mem, hist)
    }

    #[test]
    fn record_creates_and_bounds_series() {
        let (_mem, mut h) = store();
        assert_eq!(h.history_len(Source::Wildberries, "42"), 0);
        assert_eq!(h.average_price(Source::Wildberries, "42"), None);

        for p in [10.0, 20.0, 30.0, 40.0] {
            h.record_price(Source::Wildberries, "42", p);
        }
        assert_eq!(h.history_len(Source::Wildberries, "42"), 3);
        assert_eq!(h.average_price(Source::Wildberries, "42"), Some(30.0));
        // other source untouched
        assert_eq!(h.history_len(Source::YandexMarket, "42"), 0);
    }

    #[test]
    fn persist_then_reopen_round_trips_one_source() {
        let (mem, mut h) = store();
        h.record_price(Source::YandexMarket, "sku-1", 500.0);
        h.record_price(Source::YandexMarket, "sku-1", 700.0);
        h.persist(Source::YandexMarket).unwrap();

        assert!(mem.get("prices_ym").is_some());
        assert!(mem.get("prices_wb").is_none());

        let reopened = PriceHistoryStore::open(mem, 3);
        assert_eq!(reopened.history_len(Source::YandexMarket, "sku-1"), 2);
        assert_eq!(reopened.average_price(Source::YandexMarket, "sku-1"), Some(600.0));
    }

    #[test]
    fn persist_is_byte_identical_without_mutation() {
        let (mem, mut h) = store();
        h.record_price(Source::Wildberries, "b", 2.0);
        h.record_price(Source::Wildberries, "a", 1.0);
        h.persist(Source::Wildberries).unwrap();
        let first = mem.get("prices_wb").unwrap();
        h.persist(Source::Wildberries).unwrap();
        assert_eq!(first, mem.get("prices_wb").unwrap());
    }

    #[test]
    fn load_truncates_oversized_and_drops_garbage() {
        let mem = Arc::new(MemoryStore::new());
        mem.insert("prices_wb", r#"{"1": [1.0, 2.0, 3.0, 4.0, 5.0], "2": [-1.0, 0.0]}"#);
        let h = PriceHistoryStore::open(mem, 3);
        assert_eq!(h.history_len(Source::Wildberries, "1"), 3);
        assert_eq!(h.series(Source::Wildberries, "1").unwrap().oldest(), Some(3.0));
        assert_eq!(h.history_len(Source::Wildberries, "2"), 0);
        assert_eq!(h.product_count(Source::Wildberries), 1);
    }

    #[test]
    fn corrupt_document_starts_empty() {
        let mem = Arc::new(MemoryStore::new());
        mem.insert("prices_ym", "[[[");
        let h = PriceHistoryStore::open(mem, 50);
        assert_eq!(h.product_count(Source::YandexMarket), 0);
    }
}
