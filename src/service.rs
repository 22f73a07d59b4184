//! Market data service: the composition root for the fetch pipeline
//!
//! Owns one fetcher, one client, one cache and one repository, all
//! constructed explicitly and handed to the feeds, searches and loaders
//! it creates. There is no process-wide instance.

use crate::{
    cache::{MemoryCache, ResponseCache},
    client::CoinGeckoClient,
    config::ClientConfig,
    detail::CoinDetailLoader,
    error::FetchError,
    metrics::FetchMetrics,
    pagination::MarketFeed,
    repository::{CachedRepository, MarketDataSource},
    search::MarketSearch,
    types::MarketCategory,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Success rate below which the pipeline reports itself degraded
const DEGRADED_SUCCESS_RATE: f64 = 0.9;

/// Overall health of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fetches are succeeding
    Healthy,
    /// Some fetches fail or are rate limited
    Degraded,
    /// Most fetches fail
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub details: HashMap<String, serde_json::Value>,
    pub last_checked: DateTime<Utc>,
}

/// Market data service
///
/// # Example
/// ```no_run
/// use market_data_sdk::{ClientConfig, MarketCategory, MarketDataService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = MarketDataService::new(&ClientConfig::from_env())?;
/// let feed = service.feed(MarketCategory::Top100);
/// feed.refresh().await;
/// if let Some(coins) = feed.state().await.value() {
///     println!("loaded {} coins", coins.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct MarketDataService {
    client: Arc<CoinGeckoClient>,
    repository: Arc<CachedRepository>,
    page_size: u32,
}

impl MarketDataService {
    /// Creates a service with an in-memory response cache
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        Self::with_cache(config, Arc::new(MemoryCache::new()))
    }

    /// Creates a service over a caller-supplied cache (e.g. a `FileCache`)
    pub fn with_cache(
        config: &ClientConfig,
        cache: Arc<dyn ResponseCache>,
    ) -> Result<Self, FetchError> {
        let client = Arc::new(CoinGeckoClient::new(config)?);
        Ok(Self::with_client(client, cache, config.page_size))
    }

    /// Creates a service over an existing client
    pub fn with_client(
        client: Arc<CoinGeckoClient>,
        cache: Arc<dyn ResponseCache>,
        page_size: u32,
    ) -> Self {
        let repository = Arc::new(CachedRepository::new(client.clone(), cache));
        Self {
            client,
            repository,
            page_size,
        }
    }

    /// The cache-backed use-case surface
    pub fn repository(&self) -> Arc<CachedRepository> {
        self.repository.clone()
    }

    pub fn client(&self) -> Arc<CoinGeckoClient> {
        self.client.clone()
    }

    fn source(&self) -> Arc<dyn MarketDataSource> {
        self.repository.clone()
    }

    /// A new paginated feed for `category`
    pub fn feed(&self, category: MarketCategory) -> MarketFeed {
        MarketFeed::new(self.source(), category, self.page_size)
    }

    pub fn search(&self) -> MarketSearch {
        MarketSearch::new(self.source())
    }

    pub fn detail_loader(&self) -> CoinDetailLoader {
        CoinDetailLoader::new(self.source())
    }

    /// Latency and outcome statistics for the shared fetcher
    pub async fn fetch_metrics(&self) -> FetchMetrics {
        self.client.fetcher().metrics().await
    }

    /// Health derived from the fetcher's recent outcomes
    pub async fn health_check(&self) -> ComponentHealth {
        let metrics = self.fetch_metrics().await;
        health_from_metrics(&metrics, self.client.fetcher().transport_name())
    }
}

fn health_from_metrics(metrics: &FetchMetrics, transport: &str) -> ComponentHealth {
    let mut details = HashMap::new();
    details.insert("transport".to_string(), serde_json::json!(transport));
    details.insert(
        "total_fetches".to_string(),
        serde_json::json!(metrics.total_fetches),
    );
    details.insert(
        "failed_fetches".to_string(),
        serde_json::json!(metrics.failed_fetches),
    );
    details.insert(
        "rate_limited_fetches".to_string(),
        serde_json::json!(metrics.rate_limited_fetches),
    );
    details.insert(
        "latency_p50_ms".to_string(),
        serde_json::json!(metrics.latency_p50_ms),
    );

    let status = if metrics.success_rate >= DEGRADED_SUCCESS_RATE {
        HealthStatus::Healthy
    } else if metrics.success_rate >= 0.5 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    };

    let message = match status {
        HealthStatus::Healthy => "Market data fetches are succeeding".to_string(),
        HealthStatus::Degraded => format!(
            "Market data fetch success rate is {:.0}%",
            metrics.success_rate * 100.0
        ),
        HealthStatus::Unhealthy => format!(
            "Most market data fetches are failing ({} of {})",
            metrics.failed_fetches, metrics.total_fetches
        ),
    };

    ComponentHealth {
        name: "market_data".to_string(),
        status,
        message: Some(message),
        details,
        last_checked: Utc::now(),
    }
}
