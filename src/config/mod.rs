//! Configuration module for the application.
//!
//! Values are read from the environment (and `.env`, loaded by `main`) via
//! figment. Durations accept fundu strings (`30s`, `2m`, `24h`) or bare seconds.

use anyhow::Context;
use figment::{Figment, providers::Env};
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    /// Log level for this crate's targets; `RUST_LOG` overrides it entirely.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Postgres connection string.
    pub database_url: String,
    /// Grace period for background services at shutdown.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
    /// Per-request timeout against a registry.
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub fetch_timeout: Duration,
    /// Concurrent structure requests per fan-out.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Rows per upsert transaction.
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    /// Preferred language for stored names and descriptions.
    #[serde(default = "default_label_language")]
    pub label_language: String,
    /// How often `serve` queues a collection for every provider.
    #[serde(
        default = "default_collect_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub collect_interval: Duration,
    /// Number of crawl workers in `serve`.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Requests per second against one registry, 0 disables the limiter.
    #[serde(default = "default_registry_rate_limit")]
    pub registry_rate_limit: u32,
}

impl Config {
    /// Extract configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::extract(Figment::new().merge(Env::raw()))
    }

    fn extract(figment: Figment) -> anyhow::Result<Self> {
        figment.extract().context("Failed to load config")
    }

    #[cfg(test)]
    pub fn for_tests(database_url: &str) -> Self {
        Self::extract(Figment::new().merge(("database_url", database_url)))
            .expect("defaults should always extract")
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_in_flight() -> usize {
    8
}

fn default_upsert_batch_size() -> usize {
    1000
}

fn default_label_language() -> String {
    "en".to_string()
}

fn default_collect_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_worker_count() -> usize {
    2
}

fn default_registry_rate_limit() -> u32 {
    10
}

/// Environment values arrive either as numbers or as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(u64),
    Text(String),
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    let parsed = DurationParser::with_all_time_units()
        .parse(text.trim())
        .map_err(|e| format!("invalid duration '{text}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{text}': {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match DurationValue::deserialize(deserializer)? {
        DurationValue::Seconds(secs) => Ok(Duration::from_secs(secs)),
        DurationValue::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- defaults ---

    #[test]
    fn test_defaults_apply() {
        let config = Config::for_tests("postgres://localhost/sdmx");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.fetch_timeout, Duration::from_secs(60));
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.upsert_batch_size, 1000);
        assert_eq!(config.label_language, "en");
        assert_eq!(config.collect_interval, Duration::from_secs(86_400));
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.registry_rate_limit, 10);
    }

    #[test]
    fn test_missing_database_url_fails() {
        assert!(Config::extract(Figment::new()).is_err());
    }

    // --- durations ---

    #[test]
    fn test_duration_strings_and_seconds() {
        let config = Config::extract(
            Figment::new()
                .merge(("database_url", "postgres://localhost/sdmx"))
                .merge(("fetch_timeout", "90s"))
                .merge(("collect_interval", "6h"))
                .merge(("shutdown_timeout", 3)),
        )
        .unwrap();
        assert_eq!(config.fetch_timeout, Duration::from_secs(90));
        assert_eq!(config.collect_interval, Duration::from_secs(6 * 3600));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1500ms"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert!(parse_duration("soon").is_err());
    }
}
