//! # Market Data SDK
//!
//! A resilient fetch pipeline for cryptocurrency market data served by a
//! CoinGecko-compatible API: ranked market lists, coin details, price
//! history, trending coins and simple prices.
//!
//! ## Layers
//!
//! - [`transport`]: one HTTP GET per call, no retries
//! - [`fetcher`]: bounded retries with exponential backoff; `429` surfaces
//!   immediately as [`FetchError::RateLimited`]
//! - [`client`]: typed endpoints and response decoding
//! - [`cache`] and [`repository`]: cache-first reads with write-through
//! - [`pagination`], [`search`], [`detail`]: paging state, local search and
//!   concurrent detail loading, all reporting through [`Loadable`]
//!
//! ## Usage
//!
//! Everything is wired by [`MarketDataService`], which is constructed
//! explicitly and passed to whoever needs it:
//!
//! ```no_run
//! use market_data_sdk::{ClientConfig, HistoryRange, MarketCategory, MarketDataService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = MarketDataService::new(&ClientConfig::from_env())?;
//!
//! // First page of the top coins, then the next one once the user scrolls
//! let feed = service.feed(MarketCategory::Top100);
//! feed.refresh().await;
//! let items = feed.items().await;
//! if let Some(last) = items.last() {
//!     feed.load_more_if_needed(&last.id).await;
//! }
//!
//! // Detail and a year of history for one coin
//! let state = service
//!     .detail_loader()
//!     .load("bitcoin", HistoryRange::Year)
//!     .await;
//! if let Some(detail) = state.detail.value() {
//!     println!("{}: {:?}", detail.name, detail.current_price);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod detail;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod pagination;
pub mod repository;
pub mod search;
pub mod service;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheKey, FileCache, MemoryCache, ResponseCache};
pub use client::{CoinGeckoClient, MarketListQuery};
pub use config::{ClientConfig, RetryPolicy};
pub use detail::{CoinDetailLoader, CoinDetailState};
pub use error::{CacheError, FetchError};
pub use fetcher::RetryingFetcher;
pub use metrics::FetchMetrics;
pub use pagination::MarketFeed;
pub use repository::{CachedRepository, MarketDataSource};
pub use search::MarketSearch;
pub use service::{ComponentHealth, HealthStatus, MarketDataService};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
pub use types::{CoinDetail, HistoryRange, Loadable, MarketCategory, MarketCoin, PricePoint};
