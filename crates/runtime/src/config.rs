//! Application configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use processor::RetryPolicy;
use projections::CacheTtls;
use thiserror::Error;

/// A variable that is set but cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected `pretty` or `json`, got `{other}`")),
        }
    }
}

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `METRICS_ADDR`: Prometheus listener (default: `0.0.0.0:9000`)
/// - `DATABASE_URL`: PostgreSQL store; unset keeps the store in memory
/// - `REDIS_URL`: Redis cache; unset keeps the cache in memory
/// - `BUS_PARTITIONS`: partitions per topic (default: `8`)
/// - `PROCESSOR_MAX_RETRIES` (default: `5`), `PROCESSOR_INITIAL_BACKOFF_MS`
///   (default: `50`), `PROCESSOR_MAX_BACKOFF_MS` (default: `2000`)
/// - `CACHE_ITEM_TTL_SECS` (default: `300`), `CACHE_STOCK_TTL_SECS`
///   (default: `30`), `CACHE_LIST_TTL_SECS` (default: `60`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_filter: String,
    pub log_format: LogFormat,
    pub metrics_addr: SocketAddr,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub bus_partitions: u32,
    pub retry: RetryPolicy,
    pub cache_ttls: CacheTtls,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retry = RetryPolicy::builder()
            .max_retries(parse(&lookup, "PROCESSOR_MAX_RETRIES", defaults.retry.max_retries)?)
            .initial_delay(Duration::from_millis(parse(
                &lookup,
                "PROCESSOR_INITIAL_BACKOFF_MS",
                defaults.retry.initial_delay.as_millis() as u64,
            )?))
            .max_delay(Duration::from_millis(parse(
                &lookup,
                "PROCESSOR_MAX_BACKOFF_MS",
                defaults.retry.max_delay.as_millis() as u64,
            )?))
            .multiplier(defaults.retry.multiplier)
            .build();

        let cache_ttls = CacheTtls {
            item: Duration::from_secs(parse(
                &lookup,
                "CACHE_ITEM_TTL_SECS",
                defaults.cache_ttls.item.as_secs(),
            )?),
            stock: Duration::from_secs(parse(
                &lookup,
                "CACHE_STOCK_TTL_SECS",
                defaults.cache_ttls.stock.as_secs(),
            )?),
            list: Duration::from_secs(parse(
                &lookup,
                "CACHE_LIST_TTL_SECS",
                defaults.cache_ttls.list.as_secs(),
            )?),
        };

        let bus_partitions: u32 = parse(&lookup, "BUS_PARTITIONS", defaults.bus_partitions)?;
        if bus_partitions == 0 {
            return Err(ConfigError::Invalid {
                key: "BUS_PARTITIONS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            log_filter: text("RUST_LOG").unwrap_or(defaults.log_filter),
            log_format: parse(&lookup, "LOG_FORMAT", defaults.log_format)?,
            metrics_addr: parse(&lookup, "METRICS_ADDR", defaults.metrics_addr)?,
            database_url: text("DATABASE_URL"),
            redis_url: text("REDIS_URL"),
            bus_partitions,
            retry,
            cache_ttls,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            database_url: None,
            redis_url: None,
            bus_partitions: 8,
            retry: RetryPolicy::default(),
            cache_ttls: CacheTtls::default(),
        }
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
