//! Demo that replays a price sequence through the engine (in-memory state, log-only notifier).
//!
//! Usage: `replay_demo [price ...]`, e.g. `replay_demo 1000 990 1010 150 150`.

use std::sync::Arc;

use price_anomaly_monitor::monitor::deliver;
use price_anomaly_monitor::store::MemoryStore;
use price_anomaly_monitor::{DecisionEngine, EngineSettings, LogNotifier, Sample, Source};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut prices: Vec<f64> = std::env::args()
        .skip(1)
        .map(|a| a.parse::<f64>())
        .collect::<Result<_, _>>()?;
    if prices.is_empty() {
        prices = vec![1000.0, 990.0, 1010.0, 150.0, 150.0, 140.0];
    }

    let mut engine = DecisionEngine::open(Arc::new(MemoryStore::new()), &EngineSettings::default());
    let notifier = LogNotifier;

    for price in prices {
        let sample = Sample::new(
            Source::Wildberries,
            "demo",
            "Демо-товар",
            price,
            "https://www.wildberries.ru/catalog/demo/detail.aspx",
        );
        let outcome = engine.process_batch(Source::Wildberries, &[sample]);
        let (posted, _failed) = deliver(&mut engine, &notifier, &outcome.candidates).await;
        let avg = engine.history().average_price(Source::Wildberries, "demo");
        println!("price {price:>10.2}  avg {:>10.2}  posted {posted}", avg.unwrap_or_default());
    }

    println!("replay-demo done");
    Ok(())
}
