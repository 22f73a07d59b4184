//! Domain types for the market data pipeline

use crate::error::FetchError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A coin as it appears in a market list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCoin {
    /// Stable upstream identifier (e.g. "bitcoin")
    pub id: String,

    /// Ticker symbol, always uppercased
    pub symbol: String,

    /// Display name
    pub name: String,

    /// Image URL
    pub image_url: Option<String>,

    /// Current price; `None` means not yet known
    pub current_price: Option<f64>,

    /// 24h price change percentage
    pub price_change_24h_pct: Option<f64>,

    pub market_cap: Option<f64>,

    pub total_volume: Option<f64>,

    /// Recent price window (7 days upstream), when requested
    pub sparkline: Option<Vec<f64>>,
}

impl MarketCoin {
    /// Case-insensitive substring match against name and symbol.
    ///
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.name.to_lowercase().contains(needle)
            || self.symbol.to_lowercase().contains(needle)
    }
}

/// Detail page data for a single coin, in one quote currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub homepage_url: Option<String>,
    pub subreddit_url: Option<String>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub total_volume: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    /// All-time high
    pub ath: Option<f64>,
    /// All-time low
    pub atl: Option<f64>,
    pub price_change_24h_pct: Option<f64>,
}

/// One sample of a price history series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp_ms: i64, price: f64) -> Self {
        Self {
            timestamp_ms,
            price,
        }
    }

    /// The sample time as a UTC datetime
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

/// Logical market lists offered to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCategory {
    Top100,
    Gainers,
    Losers,
    Trending,
}

impl MarketCategory {
    /// Stable name used in cache keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCategory::Top100 => "top100",
            MarketCategory::Gainers => "gainers",
            MarketCategory::Losers => "losers",
            MarketCategory::Trending => "trending",
        }
    }

    /// Upstream `order` parameter for this category.
    ///
    /// Trending is not an ordering; it is served by the trending endpoint.
    pub fn ordering(&self) -> Option<&'static str> {
        match self {
            MarketCategory::Top100 => Some("market_cap_desc"),
            MarketCategory::Gainers => Some("price_change_percentage_24h_desc"),
            MarketCategory::Losers => Some("price_change_percentage_24h_asc"),
            MarketCategory::Trending => None,
        }
    }

    pub fn all() -> &'static [MarketCategory] {
        &[
            MarketCategory::Top100,
            MarketCategory::Trending,
            MarketCategory::Gainers,
            MarketCategory::Losers,
        ]
    }
}

impl fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// History window selector, sent upstream as the `days` parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1")]
    Day,
    #[default]
    #[serde(rename = "7")]
    Week,
    #[serde(rename = "30")]
    Month,
    #[serde(rename = "365")]
    Year,
}

impl HistoryRange {
    /// Wire value: "1", "7", "30" or "365"
    pub fn as_days(&self) -> &'static str {
        match self {
            HistoryRange::Day => "1",
            HistoryRange::Week => "7",
            HistoryRange::Month => "30",
            HistoryRange::Year => "365",
        }
    }

    /// Short label for display
    pub fn title(&self) -> &'static str {
        match self {
            HistoryRange::Day => "24h",
            HistoryRange::Week => "7d",
            HistoryRange::Month => "30d",
            HistoryRange::Year => "1y",
        }
    }

    /// Parses the wire value back into a range
    pub fn from_days(days: &str) -> Option<Self> {
        match days {
            "1" => Some(HistoryRange::Day),
            "7" => Some(HistoryRange::Week),
            "30" => Some(HistoryRange::Month),
            "365" => Some(HistoryRange::Year),
            _ => None,
        }
    }

    pub fn all() -> &'static [HistoryRange] {
        &[
            HistoryRange::Day,
            HistoryRange::Week,
            HistoryRange::Month,
            HistoryRange::Year,
        ]
    }
}

/// Fetch state of one logical list or detail request.
///
/// Exactly one state holds at a time; rendering code matches on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Idle,
    Loading,
    Loaded(T),
    Failed(FetchError),
}

impl<T> Default for Loadable<T> {
    fn default() -> Self {
        Loadable::Idle
    }
}

impl<T> Loadable<T> {
    /// The loaded value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Loadable::Loaded(value) => Some(value),
            Loadable::Idle | Loadable::Loading | Loadable::Failed(_) => None,
        }
    }

    /// The failure, if any
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Loadable::Failed(err) => Some(err),
            Loadable::Idle | Loadable::Loading | Loadable::Loaded(_) => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Loadable::Loaded(_))
    }

    /// Converts a fetch outcome into a terminal state
    pub fn from_result(result: Result<T, FetchError>) -> Self {
        match result {
            Ok(value) => Loadable::Loaded(value),
            Err(err) => Loadable::Failed(err),
        }
    }
}
