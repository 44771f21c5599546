// tests/engine_e2e.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use price_anomaly_monitor::engine::{BaselineMode, DecisionEngine, EngineSettings};
use price_anomaly_monitor::store::JsonFileStore;
use price_anomaly_monitor::{Sample, Source};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 3, 8, 0, 0).unwrap()
}

fn wb(id: &str, price: f64) -> Sample {
    Sample::new(
        Source::Wildberries,
        id,
        "Кофеварка",
        price,
        format!("https://www.wildberries.ru/catalog/{id}/detail.aspx"),
    )
}

fn settings(baseline: BaselineMode) -> EngineSettings {
    EngineSettings {
        baseline,
        ..EngineSettings::default()
    }
}

fn seed(engine: &mut DecisionEngine, id: &str, prices: &[f64]) {
    for p in prices {
        let out = engine.process_batch_at(Source::Wildberries, &[wb(id, *p)], t0());
        assert!(out.candidates.is_empty(), "seed price {p} must not alert");
    }
}

#[test]
fn drop_of_75_percent_alerts_and_60_does_not() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let mut engine = DecisionEngine::open(port, &settings(BaselineMode::ExcludeLatest));

    seed(&mut engine, "X", &[100.0, 100.0, 100.0]);
    seed(&mut engine, "Y", &[100.0, 100.0, 100.0]);

    let out = engine.process_batch_at(Source::Wildberries, &[wb("X", 25.0), wb("Y", 40.0)], t0());
    let keys: Vec<&str> = out.candidates.iter().map(|c| c.sample.alert_key.as_str()).collect();
    assert_eq!(keys, vec!["wb:X"]);
    assert_eq!(out.summary.no_anomaly, 1);
}

#[test]
fn default_baseline_counts_the_new_price() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let mut engine = DecisionEngine::open(port, &EngineSettings::default());

    seed(&mut engine, "X", &[100.0, 100.0, 100.0]);
    seed(&mut engine, "Y", &[100.0, 100.0, 100.0]);

    let out = engine.process_batch_at(Source::Wildberries, &[wb("X", 25.0), wb("Y", 10.0)], t0());
    assert_eq!(out.candidates.len(), 1);
    assert_eq!(out.candidates[0].sample.product_id, "Y");
    // (77.5 - 10) / 77.5
    assert!((out.candidates[0].drop_percent - 87.096_774).abs() < 1e-3);
}

#[test]
fn duplicate_suppressed_until_price_changes_or_cooldown_ends() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let mut engine = DecisionEngine::open(port, &settings(BaselineMode::ExcludeLatest));
    // long window so the repeated low price barely moves the average
    seed(&mut engine, "X", &[1000.0; 20]);

    let first = engine.process_batch_at(Source::Wildberries, &[wb("X", 100.0)], t0());
    assert_eq!(first.candidates.len(), 1);
    engine.mark_posted(&first.candidates[0], t0());
    assert!(engine.flush_posts());

    let later = t0() + Duration::hours(1);
    let again = engine.process_batch_at(Source::Wildberries, &[wb("X", 100.0)], later);
    assert!(again.candidates.is_empty());
    assert_eq!(again.summary.duplicate, 1);

    let cheaper = engine.process_batch_at(Source::Wildberries, &[wb("X", 90.0)], later);
    assert_eq!(cheaper.candidates.len(), 1);

    let next_day = t0() + Duration::hours(25);
    let repeat = engine.process_batch_at(Source::Wildberries, &[wb("X", 100.0)], next_day);
    assert_eq!(repeat.candidates.len(), 1);
}

#[test]
fn unposted_candidate_stays_eligible() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let mut engine = DecisionEngine::open(port, &settings(BaselineMode::ExcludeLatest));
    seed(&mut engine, "X", &[1000.0; 20]);

    let first = engine.process_batch_at(Source::Wildberries, &[wb("X", 100.0)], t0());
    assert_eq!(first.candidates.len(), 1);
    // delivery failed: no mark_posted

    let retry = engine.process_batch_at(
        Source::Wildberries,
        &[wb("X", 100.0)],
        t0() + Duration::seconds(5),
    );
    assert_eq!(retry.candidates.len(), 1);
}

#[test]
fn state_survives_restart_and_persist_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    {
        let mut engine = DecisionEngine::open(port.clone(), &settings(BaselineMode::ExcludeLatest));
        seed(&mut engine, "X", &[500.0, 500.0, 500.0]);
        let out = engine.process_batch_at(Source::Wildberries, &[wb("X", 50.0)], t0());
        engine.mark_posted(&out.candidates[0], t0());
        engine.flush_posts();
    }

    let prices = std::fs::read(port.path_of("prices_wb")).unwrap();
    let posts = std::fs::read(port.path_of("history")).unwrap();

    let engine = DecisionEngine::open(port.clone(), &EngineSettings::default());
    assert_eq!(engine.history().history_len(Source::Wildberries, "X"), 4);
    assert_eq!(engine.gate().record("wb:X").unwrap().last_post_ts, t0().timestamp());

    // persisting unchanged state rewrites identical bytes
    engine.history().persist(Source::Wildberries).unwrap();
    engine.gate().persist().unwrap();
    assert_eq!(prices, std::fs::read(port.path_of("prices_wb")).unwrap());
    assert_eq!(posts, std::fs::read(port.path_of("history")).unwrap());
}

#[test]
fn corrupt_files_on_disk_start_fresh() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("prices_wb.json"), "{\"X\": [1.0,").unwrap();
    std::fs::write(dir.path().join("history.json"), "garbage").unwrap();

    let port = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let engine = DecisionEngine::open(port, &EngineSettings::default());
    assert_eq!(engine.history().product_count(Source::Wildberries), 0);
    assert!(engine.gate().is_empty());
}
