// src/ingest/providers/wildberries.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::types::{Sample, SampleSource, Source};
use crate::ingest::{http_client, UNNAMED_PRODUCT};

pub const DEFAULT_SEARCH_URL: &str = "https://search.wb.ru/exactmatch/ru/common/v4/search";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    products: Option<Vec<Product>>,
}

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    /// Price in kopecks.
    #[serde(default, rename = "salePriceU")]
    sale_price_u: Option<f64>,
}

pub fn product_link(id: &str) -> String {
    format!("https://www.wildberries.ru/catalog/{id}/detail.aspx")
}

/// Convert a search API response body into samples. Listings without an id
/// or a positive price are skipped.
pub fn parse_search_response(body: &str) -> Result<Vec<Sample>> {
    let resp: SearchResponse =
        serde_json::from_str(body).context("parsing wildberries search json")?;
    let products = resp.data.and_then(|d| d.products).unwrap_or_default();

    let mut out = Vec::with_capacity(products.len());
    for p in products {
        let Some(id) = p.id else { continue };
        let price = p.sale_price_u.unwrap_or(0.0) / 100.0;
        if price <= 0.0 {
            continue;
        }
        let id = id.to_string();
        let name = p
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNNAMED_PRODUCT.to_string());
        let link = product_link(&id);
        out.push(Sample::new(Source::Wildberries, id, name, price, link));
    }
    Ok(out)
}

/// Wildberries public search API (JSON).
pub struct WildberriesSource {
    client: reqwest::Client,
    search_url: String,
    timeout: Duration,
}

impl WildberriesSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            timeout,
        })
    }

    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }
}

#[async_trait]
impl SampleSource for WildberriesSource {
    async fn fetch(&self, query: &str, page: u32) -> Result<Vec<Sample>> {
        let page = page.to_string();
        let body = self
            .client
            .get(&self.search_url)
            .query(&[
                ("appType", "1"),
                ("curr", "rub"),
                ("dest", "-1257786"),
                ("query", query),
                ("page", page.as_str()),
            ])
            .send()
            .await
            .context("wildberries search request")?
            .error_for_status()
            .context("wildberries non-2xx")?
            .text()
            .await
            .context("read wildberries body")?;

        parse_search_response(&body)
    }

    fn source(&self) -> Source {
        Source::Wildberries
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
