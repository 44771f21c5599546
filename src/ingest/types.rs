// src/ingest/types.rs
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Marketplace a sample was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Source {
    Wildberries,
    YandexMarket,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Wildberries, Source::YandexMarket];

    /// Short id used in alert keys, document names and metric labels.
    pub fn slug(self) -> &'static str {
        match self {
            Source::Wildberries => "wb",
            Source::YandexMarket => "ym",
        }
    }

    /// Human-readable store name shown in alerts.
    pub fn label(self) -> &'static str {
        match self {
            Source::Wildberries => "Wildberries",
            Source::YandexMarket => "Яндекс.Маркет",
        }
    }

    /// `"wb:123"` style key, unique per (source, product).
    pub fn alert_key(self, product_id: &str) -> String {
        format!("{}:{}", self.slug(), product_id)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// One observed (product, price) pair, already converted from the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub alert_key: String,
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub source: Source,
    pub link: String,
}

impl Sample {
    pub fn new(
        source: Source,
        product_id: impl Into<String>,
        name: impl Into<String>,
        price: f64,
        link: impl Into<String>,
    ) -> Self {
        let product_id = product_id.into();
        Self {
            alert_key: source.alert_key(&product_id),
            product_id,
            name: name.into(),
            price,
            source,
            link: link.into(),
        }
    }

    pub fn source_label(&self) -> &'static str {
        self.source.label()
    }
}

#[async_trait::async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch one result page for `query`.
    async fn fetch(&self, query: &str, page: u32) -> Result<Vec<Sample>>;
    fn source(&self) -> Source;
    /// Upper bound for a whole `fetch` call; the loop abandons the batch past it.
    fn timeout(&self) -> Duration;
}
