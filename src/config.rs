//! Runtime configuration
//!
//! Defaults come from `constants`; `ClientConfig::from_env` overlays
//! `MARKET_DATA_*` environment variables on top of them.

use crate::constants::{
    COINGECKO_API_URL, DEFAULT_PAGE_SIZE, INITIAL_BACKOFF_MS, MAX_ATTEMPTS, REQUEST_TIMEOUT_SECS,
};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Retry schedule for the fetcher: `max_attempts` total tries, sleeping
/// `initial_backoff` before the second, doubling each time after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

/// Settings for building the HTTP pipeline
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Versioned API root, without trailing slash
    pub base_url: String,

    /// Optional demo API key
    pub api_key: Option<String>,

    /// Upper bound on a single attempt
    #[serde(with = "secs")]
    pub request_timeout: Duration,

    pub retry: RetryPolicy,

    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: COINGECKO_API_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    /// Builds a config from the defaults plus any `MARKET_DATA_*` overrides.
    ///
    /// Recognised variables: `MARKET_DATA_BASE_URL`, `MARKET_DATA_API_KEY`,
    /// `MARKET_DATA_TIMEOUT_SECS`, `MARKET_DATA_MAX_ATTEMPTS`,
    /// `MARKET_DATA_INITIAL_BACKOFF_MS`, `MARKET_DATA_PAGE_SIZE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("MARKET_DATA_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        config.api_key = lookup("MARKET_DATA_API_KEY").filter(|key| !key.trim().is_empty());

        if let Some(secs) = parse_var::<u64>(&lookup, "MARKET_DATA_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "MARKET_DATA_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts.max(1);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "MARKET_DATA_INITIAL_BACKOFF_MS") {
            config.retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var::<u32>(&lookup, "MARKET_DATA_PAGE_SIZE") {
            config.page_size = size.max(1);
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparseable config value");
            None
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
