//! Use-case surface for consumers, bridging the endpoint client and the
//! response cache
//!
//! Reads go cache-first: a non-empty cached value is returned without a
//! network call. The `refresh_*` methods skip the read but still write
//! through. Cache failures of any kind count as a miss.

use crate::{
    cache::{CacheKey, ResponseCache},
    client::{CoinGeckoClient, MarketListQuery},
    constants::DEFAULT_CURRENCY,
    error::{CacheError, FetchError},
    types::{CoinDetail, HistoryRange, MarketCategory, MarketCoin, PricePoint},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Trait for market data sources consumed by list and detail screens
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// One page of a market category (1-based `page`)
    async fn fetch_market(
        &self,
        category: MarketCategory,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<MarketCoin>, FetchError>;

    /// Detail page for a coin
    async fn fetch_detail(&self, id: &str) -> Result<CoinDetail, FetchError>;

    /// Price history for a coin
    async fn fetch_history(
        &self,
        id: &str,
        range: HistoryRange,
    ) -> Result<Vec<PricePoint>, FetchError>;

    /// Like `fetch_market`, but always goes to the network
    async fn refresh_market(
        &self,
        category: MarketCategory,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<MarketCoin>, FetchError>;

    /// Like `fetch_detail`, but always goes to the network
    async fn refresh_detail(&self, id: &str) -> Result<CoinDetail, FetchError>;

    /// Like `fetch_history`, but always goes to the network
    async fn refresh_history(
        &self,
        id: &str,
        range: HistoryRange,
    ) -> Result<Vec<PricePoint>, FetchError>;
}

/// Whether a read may be answered from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPolicy {
    CacheFirst,
    Refresh,
}

/// Values with a notion of "nothing here"; empty cached values are misses
trait Cacheable: Serialize + DeserializeOwned + Send {
    fn is_empty_value(&self) -> bool {
        false
    }
}

impl<T: Serialize + DeserializeOwned + Send> Cacheable for Vec<T> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Cacheable for CoinDetail {}

/// Market data repository with a fast-path response cache
pub struct CachedRepository {
    client: Arc<CoinGeckoClient>,
    cache: Arc<dyn ResponseCache>,
    currency: String,
}

impl CachedRepository {
    pub fn new(client: Arc<CoinGeckoClient>, cache: Arc<dyn ResponseCache>) -> Self {
        Self {
            client,
            cache,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn client(&self) -> &Arc<CoinGeckoClient> {
        &self.client
    }

    async fn market(
        &self,
        category: MarketCategory,
        page: u32,
        page_size: u32,
        policy: ReadPolicy,
    ) -> Result<Vec<MarketCoin>, FetchError> {
        let key = CacheKey::market(category, page, page_size);
        self.cached(&key, policy, || async {
            match category.ordering() {
                Some(ordering) => {
                    let query = MarketListQuery::new(ordering, page_size)
                        .page(page)
                        .currency(self.currency.as_str());
                    self.client.market_list(&query).await
                }
                // Trending is a single list; later pages are past the end.
                None if page > 1 => Ok(Vec::new()),
                None => self.client.trending(&self.currency).await,
            }
        })
        .await
    }

    async fn detail(&self, id: &str, policy: ReadPolicy) -> Result<CoinDetail, FetchError> {
        let key = CacheKey::detail(id);
        self.cached(&key, policy, || self.client.coin_detail(id))
            .await
    }

    async fn history(
        &self,
        id: &str,
        range: HistoryRange,
        policy: ReadPolicy,
    ) -> Result<Vec<PricePoint>, FetchError> {
        let key = CacheKey::history(id, range);
        self.cached(&key, policy, || {
            self.client.history_series(id, &self.currency, range)
        })
        .await
    }

    async fn cached<T, F, Fut>(
        &self,
        key: &str,
        policy: ReadPolicy,
        fetch: F,
    ) -> Result<T, FetchError>
    where
        T: Cacheable,
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, FetchError>> + Send,
    {
        if policy == ReadPolicy::CacheFirst {
            if let Some(value) = self.read_cache::<T>(key).await {
                tracing::debug!(key, "Cache hit");
                return Ok(value);
            }
        }

        let value = fetch().await?;
        self.write_cache(key, &value).await;
        Ok(value)
    }

    async fn read_cache<T: Cacheable>(&self, key: &str) -> Option<T> {
        let entry = match self.cache.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match decode_payload::<T>(&entry.payload) {
            Ok(value) if !value.is_empty_value() => Some(value),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached payload unreadable, treating as miss");
                None
            }
        }
    }

    async fn write_cache<T: Cacheable>(&self, key: &str, value: &T) {
        let result = match encode_payload(value) {
            Ok(payload) => self.cache.put(key, payload).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
    }
}

fn decode_payload<T: Cacheable>(payload: &[u8]) -> Result<T, CacheError> {
    Ok(serde_json::from_slice(payload)?)
}

fn encode_payload<T: Cacheable>(value: &T) -> Result<Vec<u8>, CacheError> {
    Ok(serde_json::to_vec(value)?)
}

#[async_trait]
impl MarketDataSource for CachedRepository {
    async fn fetch_market(
        &self,
        category: MarketCategory,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<MarketCoin>, FetchError> {
        self.market(category, page, page_size, ReadPolicy::CacheFirst)
            .await
    }

    async fn fetch_detail(&self, id: &str) -> Result<CoinDetail, FetchError> {
        self.detail(id, ReadPolicy::CacheFirst).await
    }

    async fn fetch_history(
        &self,
        id: &str,
        range: HistoryRange,
    ) -> Result<Vec<PricePoint>, FetchError> {
        self.history(id, range, ReadPolicy::CacheFirst).await
    }

    async fn refresh_market(
        &self,
        category: MarketCategory,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<MarketCoin>, FetchError> {
        self.market(category, page, page_size, ReadPolicy::Refresh)
            .await
    }

    async fn refresh_detail(&self, id: &str) -> Result<CoinDetail, FetchError> {
        self.detail(id, ReadPolicy::Refresh).await
    }

    async fn refresh_history(
        &self,
        id: &str,
        range: HistoryRange,
    ) -> Result<Vec<PricePoint>, FetchError> {
        self.history(id, range, ReadPolicy::Refresh).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, MemoryCache};
    use crate::fetcher::test_support::fetcher;
    use crate::transport::mock::MockTransport;

    const BASE: &str = "https://api.example.com/api/v3";
    const PAGE_BODY: &str =
        r#"[{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 64000.0}]"#;

    fn repository(
        transport: &Arc<MockTransport>,
        cache: Arc<dyn ResponseCache>,
    ) -> CachedRepository {
        let (fetcher, _) = fetcher(transport.clone());
        let client = CoinGeckoClient::with_fetcher(Arc::new(fetcher), BASE).unwrap();
        CachedRepository::new(Arc::new(client), cache)
    }

    /// Cache whose every operation fails
    struct BrokenCache;

    #[async_trait]
    impl ResponseCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(std::io::Error::other("disk gone").into())
        }

        async fn put(&self, _key: &str, _payload: Vec<u8>) -> Result<(), CacheError> {
            Err(std::io::Error::other("disk gone").into())
        }
    }

    #[tokio::test]
    async fn test_cached_market_list_skips_network() {
        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(MemoryCache::new());
        let repo = repository(&transport, cache.clone());

        let coins = vec![mock::coin("bitcoin", "Bitcoin", "BTC")];
        let key = CacheKey::market(MarketCategory::Top100, 1, 50);
        cache
            .put(&key, serde_json::to_vec(&coins).unwrap())
            .await
            .unwrap();

        let result = repo
            .fetch_market(MarketCategory::Top100, 1, 50)
            .await
            .unwrap();
        assert_eq!(result, coins);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_writes_through() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, PAGE_BODY);
        let cache = Arc::new(MemoryCache::new());
        let repo = repository(&transport, cache.clone());

        let first = repo
            .fetch_market(MarketCategory::Gainers, 1, 50)
            .await
            .unwrap();
        assert_eq!(first[0].symbol, "BTC");
        assert!(transport
            .last_url()
            .unwrap()
            .contains("order=price_change_percentage_24h_desc"));

        let second = repo
            .fetch_market(MarketCategory::Gainers, 1, 50)
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(transport.call_count(), 1);
        assert!(cache
            .get("market_gainers_1_50")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_refresh_bypasses_read_but_writes() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, PAGE_BODY);
        let cache = Arc::new(MemoryCache::new());
        let repo = repository(&transport, cache.clone());

        let stale = vec![mock::coin("old", "Old", "OLD")];
        let key = CacheKey::market(MarketCategory::Top100, 1, 50);
        cache
            .put(&key, serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();

        let fresh = repo
            .refresh_market(MarketCategory::Top100, 1, 50)
            .await
            .unwrap();
        assert_eq!(fresh[0].id, "bitcoin");
        assert_eq!(transport.call_count(), 1);

        let cached = repo
            .fetch_market(MarketCategory::Top100, 1, 50)
            .await
            .unwrap();
        assert_eq!(cached, fresh);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_cached_list_is_a_miss() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, PAGE_BODY);
        let cache = Arc::new(MemoryCache::new());
        cache
            .put("market_top100_1_50", b"[]".to_vec())
            .await
            .unwrap();
        let repo = repository(&transport, cache);

        let coins = repo
            .fetch_market(MarketCategory::Top100, 1, 50)
            .await
            .unwrap();
        assert_eq!(coins.len(), 1);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_a_miss() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, r#"{"prices": [[1000, 10]]}"#);
        let cache = Arc::new(MemoryCache::new());
        cache
            .put("history_bitcoin_7", b"not json".to_vec())
            .await
            .unwrap();
        let repo = repository(&transport, cache);

        let points = repo
            .fetch_history("bitcoin", HistoryRange::Week)
            .await
            .unwrap();
        assert_eq!(points, vec![PricePoint::new(1000, 10.0)]);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_errors_never_surface() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, r#"{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin"}"#);
        let repo = repository(&transport, Arc::new(BrokenCache));

        let detail = repo.fetch_detail("bitcoin").await.unwrap();
        assert_eq!(detail.symbol, "BTC");
    }

    #[tokio::test]
    async fn test_detail_is_cached() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, r#"{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin"}"#);
        let repo = repository(&transport, Arc::new(MemoryCache::new()));

        repo.fetch_detail("bitcoin").await.unwrap();
        repo.fetch_detail("bitcoin").await.unwrap();
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_errors_are_not_cached() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(429, "").push_json(200, PAGE_BODY);
        let cache = Arc::new(MemoryCache::new());
        let repo = repository(&transport, cache.clone());

        let err = repo
            .fetch_market(MarketCategory::Top100, 1, 50)
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert!(cache.is_empty().await);

        let coins = repo
            .fetch_market(MarketCategory::Top100, 1, 50)
            .await
            .unwrap();
        assert_eq!(coins.len(), 1);
    }

    #[tokio::test]
    async fn test_trending_later_pages_are_empty() {
        let transport = Arc::new(MockTransport::new());
        let repo = repository(&transport, Arc::new(MemoryCache::new()));

        let coins = repo
            .fetch_market(MarketCategory::Trending, 2, 50)
            .await
            .unwrap();
        assert!(coins.is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_detail_overwrites_cached_entry() {
        let transport = Arc::new(MockTransport::new());
        transport
            .push_json(200, r#"{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin"}"#)
            .push_json(200, r#"{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin Core"}"#);
        let cache = Arc::new(MemoryCache::new());
        let repo = repository(&transport, cache.clone());

        repo.fetch_detail("bitcoin").await.unwrap();
        let fresh = repo.refresh_detail("bitcoin").await.unwrap();
        assert_eq!(fresh.name, "Bitcoin Core");
        assert_eq!(transport.call_count(), 2);

        let entry = cache.get("detail_bitcoin").await.unwrap().unwrap();
        let cached: CoinDetail = serde_json::from_slice(&entry.payload).unwrap();
        assert_eq!(cached, fresh);
        assert_eq!(repo.fetch_detail("bitcoin").await.unwrap(), fresh);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_history_overwrites_cached_entry() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, r#"{"prices": [[5000, 50]]}"#);
        let cache = Arc::new(MemoryCache::new());
        let stale = vec![PricePoint::new(1000, 10.0)];
        cache
            .put("history_bitcoin_30", serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();
        let repo = repository(&transport, cache.clone());

        let fresh = repo
            .refresh_history("bitcoin", HistoryRange::Month)
            .await
            .unwrap();
        assert_eq!(fresh, vec![PricePoint::new(5000, 50.0)]);
        assert_eq!(transport.call_count(), 1);
        assert!(transport.last_url().unwrap().contains("days=30"));

        let entry = cache.get("history_bitcoin_30").await.unwrap().unwrap();
        let cached: Vec<PricePoint> = serde_json::from_slice(&entry.payload).unwrap();
        assert_eq!(cached, fresh);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_cached_entry() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(429, "");
        let cache = Arc::new(MemoryCache::new());
        let coins = vec![mock::coin("bitcoin", "Bitcoin", "BTC")];
        cache
            .put("market_top100_1_50", serde_json::to_vec(&coins).unwrap())
            .await
            .unwrap();
        let repo = repository(&transport, cache);

        let err = repo
            .refresh_market(MarketCategory::Top100, 1, 50)
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        let cached = repo
            .fetch_market(MarketCategory::Top100, 1, 50)
            .await
            .unwrap();
        assert_eq!(cached, coins);
    }

    #[test]
    fn test_unreadable_payload_is_a_serialization_error() {
        let err = decode_payload::<Vec<MarketCoin>>(b"not json").unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
