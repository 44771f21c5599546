// src/config/monitor.rs
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::anomaly::{AnomalyRule, DEFAULT_MIN_HISTORY, DEFAULT_THRESHOLD_PERCENT};
use crate::engine::{BaselineMode, EngineSettings};
use crate::gate::DEFAULT_REPOST_AFTER_SECS;
use crate::ingest::providers::{wildberries, yandex_market};
use crate::rolling::DEFAULT_PRICE_MEMORY;

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

/// Broad category coverage; one query per polling cycle, round robin.
pub const POPULAR_QUERIES: &[&str] = &[
    "смартфон", "ноутбук", "планшет", "наушники", "телевизор", "колонка", "пылесос", "кресло",
    "стул", "кроссовки", "ботинки", "куртка", "платье", "джинсы", "игрушка", "конструктор",
    "LEGO", "духи", "шампунь", "крем", "чайник", "кофеварка", "микроволновка", "блендер", "SSD",
    "видеокарта", "apple", "samsung", "xiaomi", "dyson", "philips", "sony",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between polling cycles.
    pub check_interval_secs: u64,
    pub anomaly_drop_percent: f64,
    pub need_history_min: usize,
    pub repost_after_secs: i64,
    pub price_memory: usize,
    pub baseline: BaselineMode,
    pub data_dir: PathBuf,
    pub wb_timeout_secs: u64,
    pub ym_timeout_secs: u64,
    /// No token → alerts are only logged.
    pub telegram_token: Option<String>,
    pub channel_id: Option<String>,
    /// e.g. "0.0.0.0:8080"; unset disables the HTTP surface.
    pub http_addr: Option<String>,
    pub queries: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            anomaly_drop_percent: DEFAULT_THRESHOLD_PERCENT,
            need_history_min: DEFAULT_MIN_HISTORY,
            repost_after_secs: DEFAULT_REPOST_AFTER_SECS,
            price_memory: DEFAULT_PRICE_MEMORY,
            baseline: BaselineMode::default(),
            data_dir: PathBuf::from("data"),
            wb_timeout_secs: wildberries::DEFAULT_TIMEOUT_SECS,
            ym_timeout_secs: yandex_market::DEFAULT_TIMEOUT_SECS,
            telegram_token: None,
            channel_id: None,
            http_addr: None,
            queries: POPULAR_QUERIES.iter().map(|q| q.to_string()).collect(),
        }
    }
}

impl MonitorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading monitor config {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parsing monitor config {}", path.display()))
    }

    /// Defaults → config file → process environment.
    /// 1) $MONITOR_CONFIG_PATH (must exist)
    /// 2) config/monitor.toml if present
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
                }
                Self::load_from_file(&pb)?
            }
            Err(_) => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Override fields from `lookup` (normally `std::env::var`).
    /// Unparsable values are an error; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("CHECK_INTERVAL_SECS") {
            self.check_interval_secs = parse_var("CHECK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("ANOMALY_DROP_PERCENT") {
            self.anomaly_drop_percent = parse_var("ANOMALY_DROP_PERCENT", &v)?;
        }
        if let Some(v) = get("NEED_HISTORY_MIN") {
            self.need_history_min = parse_var("NEED_HISTORY_MIN", &v)?;
        }
        if let Some(v) = get("REPOST_AFTER_SECS") {
            self.repost_after_secs = parse_var("REPOST_AFTER_SECS", &v)?;
        }
        if let Some(v) = get("PRICE_MEMORY") {
            self.price_memory = parse_var("PRICE_MEMORY", &v)?;
        }
        if let Some(v) = get("BASELINE_MODE") {
            self.baseline = match v.to_ascii_lowercase().as_str() {
                "include_latest" => BaselineMode::IncludeLatest,
                "exclude_latest" => BaselineMode::ExcludeLatest,
                other => bail!("BASELINE_MODE: unsupported value {other:?}"),
            };
        }
        if let Some(v) = get("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("WB_TIMEOUT_SECS") {
            self.wb_timeout_secs = parse_var("WB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("YM_TIMEOUT_SECS") {
            self.ym_timeout_secs = parse_var("YM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("TELEGRAM_TOKEN") {
            self.telegram_token = Some(v);
        }
        if let Some(v) = get("CHANNEL_ID") {
            self.channel_id = Some(v);
        }
        if let Some(v) = get("HTTP_ADDR") {
            self.http_addr = Some(v);
        }
        if let Some(v) = get("MONITOR_QUERIES") {
            self.queries = v
                .split(',')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    /// Clamp values that would make the loop or the rule meaningless.
    pub fn sanitize(&mut self) {
        let pct = self.anomaly_drop_percent;
        if !(pct.is_finite() && (0.0..=100.0).contains(&pct)) {
            self.anomaly_drop_percent = DEFAULT_THRESHOLD_PERCENT;
        }
        self.need_history_min = self.need_history_min.max(1);
        self.price_memory = self.price_memory.max(1);
        self.repost_after_secs = self.repost_after_secs.max(0);
        self.wb_timeout_secs = self.wb_timeout_secs.max(1);
        self.ym_timeout_secs = self.ym_timeout_secs.max(1);
        self.queries.retain(|q| !q.trim().is_empty());
        if self.queries.is_empty() {
            self.queries = Self::default().queries;
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            rule: AnomalyRule {
                threshold_percent: self.anomaly_drop_percent,
                min_history: self.need_history_min,
            },
            baseline: self.baseline,
            price_memory: self.price_memory,
            repost_after_secs: self.repost_after_secs,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Token and channel, when both are configured.
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (self.telegram_token.as_deref(), self.channel_id.as_deref()) {
            (Some(t), Some(c)) => Some((t, c)),
            _ => None,
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow!("{key}: cannot parse {raw:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = MonitorConfig::default();
        assert_eq!(c.check_interval_secs, 5);
        assert_eq!(c.anomaly_drop_percent, 70.0);
        assert_eq!(c.need_history_min, 3);
        assert_eq!(c.repost_after_secs, 86_400);
        assert_eq!(c.price_memory, 50);
        assert_eq!(c.wb_timeout_secs, 20);
        assert_eq!(c.ym_timeout_secs, 25);
        assert_eq!(c.baseline, BaselineMode::IncludeLatest);
        assert!(c.telegram().is_none());
    }

    #[test]
    fn env_overrides_and_queries() {
        let mut c = MonitorConfig::default();
        c.apply_env(env(&[
            ("ANOMALY_DROP_PERCENT", "55.5"),
            ("NEED_HISTORY_MIN", "5"),
            ("BASELINE_MODE", "exclude_latest"),
            ("TELEGRAM_TOKEN", "t"),
            ("CHANNEL_ID", "@deals"),
            ("MONITOR_QUERIES", " ssd , ,lego "),
            ("PRICE_MEMORY", ""),
        ]))
        .unwrap();
        assert_eq!(c.anomaly_drop_percent, 55.5);
        assert_eq!(c.need_history_min, 5);
        assert_eq!(c.baseline, BaselineMode::ExcludeLatest);
        assert_eq!(c.telegram(), Some(("t", "@deals")));
        assert_eq!(c.queries, vec!["ssd".to_string(), "lego".to_string()]);
        assert_eq!(c.price_memory, 50);
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let mut c = MonitorConfig::default();
        let err = c.apply_env(env(&[("CHECK_INTERVAL_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("CHECK_INTERVAL_SECS"));
    }

    #[test]
    fn toml_partial_file_keeps_defaults() {
        let c: MonitorConfig = toml::from_str(
            r#"
            anomaly_drop_percent = 80.0
            baseline = "exclude_latest"
            queries = ["ssd"]
            "#,
        )
        .unwrap();
        assert_eq!(c.anomaly_drop_percent, 80.0);
        assert_eq!(c.baseline, BaselineMode::ExcludeLatest);
        assert_eq!(c.queries, vec!["ssd".to_string()]);
        assert_eq!(c.check_interval_secs, 5);
    }

    #[test]
    fn sanitize_clamps_nonsense() {
        let mut c = MonitorConfig {
            anomaly_drop_percent: 250.0,
            need_history_min: 0,
            price_memory: 0,
            repost_after_secs: -5,
            queries: vec!["  ".into()],
            ..MonitorConfig::default()
        };
        c.sanitize();
        assert_eq!(c.anomaly_drop_percent, 70.0);
        assert_eq!(c.need_history_min, 1);
        assert_eq!(c.price_memory, 1);
        assert_eq!(c.repost_after_secs, 0);
        assert_eq!(c.queries.len(), POPULAR_QUERIES.len());
    }
}
