// src/ingest/providers/yandex_market.rs
//
// Lightweight scrape of the Yandex.Market search page: no headless browser,
// just regexes over the server-rendered listing cards.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::types::{Sample, SampleSource, Source};
use crate::ingest::{http_client, UNNAMED_PRODUCT};

pub const DEFAULT_SEARCH_URL: &str = "https://market.yandex.ru/search";
pub const DEFAULT_TIMEOUT_SECS: u64 = 25;

const CARD_MARKER: &str = r#"data-auto="serp-item""#;
/// Only the first cards are looked at; the rest are mostly ads and widgets.
const MAX_CARDS: usize = 40;

static RE_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"aria-label="[^"]*?(\d[\d\s]+)\s*₽""#).expect("price regex"));
static RE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-(?:sku|product-id)="([^"]+)""#).expect("id regex"));
static RE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:title|alt)="([^"]{10,160})""#).expect("name regex"));

pub fn product_link(id: &str) -> String {
    format!("https://market.yandex.ru/product--{id}")
}

/// Extract samples from a search results page. Cards without both a price
/// and an id are skipped.
pub fn parse_search_page(html: &str) -> Vec<Sample> {
    let mut out = Vec::new();
    for card in html.split(CARD_MARKER).take(MAX_CARDS) {
        let (Some(price_cap), Some(id_cap)) = (RE_PRICE.captures(card), RE_ID.captures(card)) else {
            continue;
        };
        let digits: String = price_cap[1].chars().filter(char::is_ascii_digit).collect();
        let Ok(price) = digits.parse::<f64>() else {
            continue;
        };
        let id = id_cap[1].to_string();
        let name = RE_NAME
            .captures(card)
            .map(|c| html_escape::decode_html_entities(c[1].trim()).into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNNAMED_PRODUCT.to_string());
        let link = product_link(&id);
        out.push(Sample::new(Source::YandexMarket, id, name, price, link));
    }
    out
}

pub struct YandexMarketSource {
    client: reqwest::Client,
    search_url: String,
    timeout: Duration,
}

impl YandexMarketSource {
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
impl SampleSource for YandexMarketSource {
    async fn fetch(&self, query: &str, page: u32) -> Result<Vec<Sample>> {
        let page = page.to_string();
        let html = self
            .client
            .get(&self.search_url)
            .query(&[("text", query), ("page", page.as_str())])
            .send()
            .await
            .context("yandex market search request")?
            .error_for_status()
            .context("yandex market non-2xx")?
            .text()
            .await
            .context("read yandex market body")?;

        Ok(parse_search_page(&html))
    }

    fn source(&self) -> Source {
        Source::YandexMarket
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
