//! Error types for the market data pipeline

use std::time::Duration;
use thiserror::Error;

/// Classified failure of a fetch, as seen by every layer above the transport.
///
/// The retrying fetcher resolves `Transport`, `Http` and `Decode` locally up
/// to its attempt budget and then surfaces the last one unchanged.
/// `RateLimited` is surfaced on first occurrence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connectivity failure (DNS, timeout, connection reset)
    #[error("Network error: {0}")]
    Transport(String),

    /// Non-2xx, non-429 response
    #[error("Server error (HTTP {status})")]
    Http { status: u16 },

    /// HTTP 429, with the optional `Retry-After` hint in seconds
    #[error("{}", rate_limited_message(*retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Payload did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Request could not be built (bad base URL or path)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn rate_limited_message(retry_after_secs: Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!("Rate limited. Try again in {}s", secs),
        None => "Rate limited. Try again soon".to_string(),
    }
}

impl FetchError {
    /// Creates a Transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a Decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates an InvalidRequest error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// True for HTTP 429
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether the fetcher may spend another attempt on this error
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Http { .. } | Self::Decode(_) => true,
            Self::RateLimited { .. } | Self::InvalidRequest(_) => false,
        }
    }

    /// The upstream wait hint, if this is a rate-limit error that carried one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Storage-layer failures inside the response cache.
///
/// Never surfaced past the repository: callers treat these as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the backing store failed
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cached payload could not be (de)serialized
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
