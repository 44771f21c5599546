// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use metrics::{counter, histogram};

use crate::ingest::types::{Sample, SampleSource, Source};
use crate::telemetry as m;

/// Desktop browser UA; both marketplaces serve reduced pages to unknown clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Fallback display name when a listing has none.
pub const UNNAMED_PRODUCT: &str = "Товар";

/// HTTP client shared by a provider; `timeout` bounds each request.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("build http client")
}

/// Drop samples the core must never see: empty ids, non-finite or
/// non-positive prices, and samples labelled with a different source.
/// Returns (kept, rejected_count).
pub fn sanitize(source: Source, raw: Vec<Sample>) -> (Vec<Sample>, usize) {
    let mut rejected = 0usize;
    let mut kept = Vec::with_capacity(raw.len());
    for s in raw {
        let ok = s.source == source
            && !s.product_id.trim().is_empty()
            && s.price.is_finite()
            && s.price > 0.0;
        if ok {
            kept.push(s);
        } else {
            tracing::debug!(source = %source, id = %s.product_id, price = s.price, "malformed sample dropped");
            rejected += 1;
        }
    }
    (kept, rejected)
}

/// Fetch one page from `provider` under its timeout and sanitize the result.
/// An error here means the whole batch is abandoned for this cycle.
pub async fn fetch_samples(
    provider: &dyn SampleSource,
    query: &str,
    page: u32,
) -> Result<Vec<Sample>> {
    let source = provider.source();
    let t0 = Instant::now();

    let fetched = tokio::time::timeout(provider.timeout(), provider.fetch(query, page)).await;
    histogram!(m::FETCH_MS, "source" => source.slug()).record(t0.elapsed().as_secs_f64() * 1_000.0);

    let raw = match fetched {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            counter!(m::FETCH_ERRORS_TOTAL, "source" => source.slug(), "kind" => "error").increment(1);
            return Err(e.context(format!("{source} fetch failed for {query:?}")));
        }
        Err(_) => {
            counter!(m::FETCH_ERRORS_TOTAL, "source" => source.slug(), "kind" => "timeout").increment(1);
            return Err(anyhow!(
                "{source} fetch timed out after {}s for {query:?}",
                provider.timeout().as_secs()
            ));
        }
    };

    let (kept, rejected) = sanitize(source, raw);
    if rejected > 0 {
        counter!(m::REJECTED_SAMPLES_TOTAL, "source" => source.slug()).increment(rejected as u64);
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_bad_price_and_missing_id() {
        let raw = vec![
            Sample::new(Source::Wildberries, "1", "ok", 10.0, "l"),
            Sample::new(Source::Wildberries, "", "no id", 10.0, "l"),
            Sample::new(Source::Wildberries, "2", "zero", 0.0, "l"),
            Sample::new(Source::Wildberries, "3", "neg", -5.0, "l"),
            Sample::new(Source::Wildberries, "4", "nan", f64::NAN, "l"),
            Sample::new(Source::YandexMarket, "5", "other source", 10.0, "l"),
        ];
        let (kept, rejected) = sanitize(Source::Wildberries, raw);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].product_id, "1");
        assert_eq!(rejected, 5);
    }
}
