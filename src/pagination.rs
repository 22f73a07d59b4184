//! Paginated market list with infinite-scroll loading and local filtering
//!
//! A `MarketFeed` accumulates pages for one category. At most one fetch is in
//! flight per feed: a `load_more_if_needed` that arrives while a fetch is
//! running is dropped, not queued. The state lock is never held across a
//! network call.

use crate::{
    constants::TRAILING_WINDOW,
    error::FetchError,
    repository::MarketDataSource,
    types::{Loadable, MarketCategory, MarketCoin},
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
struct FeedState {
    /// What rendering code sees: the filtered view of `items`
    state: Loadable<Vec<MarketCoin>>,
    /// Every item accumulated since the last refresh
    items: Vec<MarketCoin>,
    /// Last page successfully appended
    page: u32,
    can_load_more: bool,
    in_flight: bool,
    /// Lowercased, trimmed filter text
    query: String,
    /// Bumped by every refresh; stale page results are discarded
    generation: u64,
    /// Set by `refresh`; later pages then bypass the cache as well
    force_network: bool,
}

impl FeedState {
    fn visible(&self) -> Vec<MarketCoin> {
        filter_coins(&self.items, &self.query)
    }

    fn is_near_end(&self, item_id: &str) -> bool {
        let window_start = self.items.len().saturating_sub(TRAILING_WINDOW);
        self.items[window_start..]
            .iter()
            .any(|coin| coin.id == item_id)
    }
}

/// Case-insensitive substring match on name and symbol; blank text keeps all
pub fn filter_coins(coins: &[MarketCoin], text: &str) -> Vec<MarketCoin> {
    let needle = text.trim().to_lowercase();
    coins
        .iter()
        .filter(|coin| coin.matches(&needle))
        .cloned()
        .collect()
}

/// Accumulating, filterable market list for one category
pub struct MarketFeed {
    source: Arc<dyn MarketDataSource>,
    category: MarketCategory,
    page_size: u32,
    inner: Mutex<FeedState>,
}

impl MarketFeed {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        category: MarketCategory,
        page_size: u32,
    ) -> Self {
        Self {
            source,
            category,
            page_size: page_size.max(1),
            inner: Mutex::new(FeedState {
                state: Loadable::Idle,
                items: Vec::new(),
                page: 0,
                can_load_more: true,
                in_flight: false,
                query: String::new(),
                generation: 0,
                force_network: false,
            }),
        }
    }

    pub fn category(&self) -> MarketCategory {
        self.category
    }

    /// Current (filtered) state
    pub async fn state(&self) -> Loadable<Vec<MarketCoin>> {
        self.inner.lock().await.state.clone()
    }

    /// Every accumulated item, ignoring the filter
    pub async fn items(&self) -> Vec<MarketCoin> {
        self.inner.lock().await.items.clone()
    }

    pub async fn can_load_more(&self) -> bool {
        self.inner.lock().await.can_load_more
    }

    pub async fn is_fetching(&self) -> bool {
        self.inner.lock().await.in_flight
    }

    /// Last page appended (0 before the first load)
    pub async fn page(&self) -> u32 {
        self.inner.lock().await.page
    }

    /// Clears the list and loads the first page, answering from the cache
    /// when it holds one. Later pages are read cache-first too.
    pub async fn load(&self) {
        self.reset_and_load(false).await;
    }

    /// Clears the list and loads the first page from the network,
    /// overwriting the cached copy. Later pages also skip the cache read.
    ///
    /// A first-page failure becomes `Failed`. Any load-more still running
    /// for the previous generation has its result discarded.
    pub async fn refresh(&self) {
        self.reset_and_load(true).await;
    }

    async fn reset_and_load(&self, force_network: bool) {
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.page = 0;
            inner.items.clear();
            inner.can_load_more = true;
            inner.in_flight = true;
            inner.force_network = force_network;
            inner.state = Loadable::Loading;
            inner.generation
        };

        let result = self.fetch_page(1, force_network).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        inner.in_flight = false;
        match result {
            Ok(coins) => {
                tracing::debug!(
                    category = %self.category,
                    count = coins.len(),
                    "Loaded first page"
                );
                inner.page = 1;
                inner.can_load_more = !coins.is_empty();
                inner.items = coins;
                inner.state = Loadable::Loaded(inner.visible());
            }
            Err(e) => {
                tracing::warn!(category = %self.category, error = %e, "First page failed");
                inner.can_load_more = false;
                inner.state = Loadable::Failed(e);
            }
        }
    }

    /// Loads the next page if `visible_item_id` is within the trailing window
    /// of the accumulated list.
    ///
    /// Returns true if a fetch was issued. An empty page ends pagination; a
    /// failed page also ends it but keeps the items already loaded.
    pub async fn load_more_if_needed(&self, visible_item_id: &str) -> bool {
        let (generation, next_page, force_network) = {
            let mut inner = self.inner.lock().await;
            if inner.in_flight
                || !inner.can_load_more
                || !inner.state.is_loaded()
                || !inner.is_near_end(visible_item_id)
            {
                return false;
            }
            inner.in_flight = true;
            (inner.generation, inner.page + 1, inner.force_network)
        };

        tracing::debug!(category = %self.category, page = next_page, "Loading next page");
        let result = self.fetch_page(next_page, force_network).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return true;
        }
        inner.in_flight = false;
        match result {
            Ok(coins) if coins.is_empty() => {
                tracing::debug!(category = %self.category, page = next_page, "End of data");
                inner.can_load_more = false;
            }
            Ok(coins) => {
                inner.page = next_page;
                let known: HashSet<String> =
                    inner.items.iter().map(|coin| coin.id.clone()).collect();
                inner
                    .items
                    .extend(coins.into_iter().filter(|coin| !known.contains(&coin.id)));
                inner.state = Loadable::Loaded(inner.visible());
            }
            Err(e) => {
                tracing::warn!(
                    category = %self.category,
                    page = next_page,
                    error = %e,
                    "Next page failed, pagination stopped"
                );
                inner.can_load_more = false;
            }
        }
        true
    }

    async fn fetch_page(
        &self,
        page: u32,
        force_network: bool,
    ) -> Result<Vec<MarketCoin>, FetchError> {
        if force_network {
            self.source
                .refresh_market(self.category, page, self.page_size)
                .await
        } else {
            self.source
                .fetch_market(self.category, page, self.page_size)
                .await
        }
    }

    /// Sets the filter text and re-derives the visible list without any
    /// network call. Returns the visible items.
    pub async fn apply_filter(&self, text: &str) -> Vec<MarketCoin> {
        let mut inner = self.inner.lock().await;
        inner.query = text.trim().to_lowercase();
        if inner.state.is_loaded() {
            let visible = inner.visible();
            inner.state = Loadable::Loaded(visible.clone());
            visible
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::{coin, coins, MockSource};
    use std::time::Duration;

    fn feed(source: &Arc<MockSource>) -> MarketFeed {
        MarketFeed::new(source.clone(), MarketCategory::Top100, 10)
    }

    fn ids(coins: &[MarketCoin]) -> Vec<String> {
        coins.iter().map(|c| c.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_refresh_loads_first_page() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        let feed = feed(&source);

        assert_eq!(feed.state().await, Loadable::Idle);
        feed.refresh().await;

        let state = feed.state().await;
        assert_eq!(state.value().map(Vec::len), Some(10));
        assert_eq!(feed.page().await, 1);
        assert_eq!(
            source.forced_market_calls(),
            vec![(MarketCategory::Top100, 1, 10)]
        );
    }

    #[tokio::test]
    async fn test_load_reads_cache_first() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(coins(10, 10)));
        let feed = feed(&source);

        feed.load().await;
        assert_eq!(feed.state().await.value().map(Vec::len), Some(10));
        assert!(feed.load_more_if_needed("c9").await);
        assert_eq!(source.market_calls().len(), 2);
        assert!(source.forced_market_calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache_for_later_pages() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(coins(10, 10)));
        let feed = feed(&source);

        feed.load().await;
        feed.refresh().await;
        assert!(feed.load_more_if_needed("c9").await);
        assert_eq!(
            source.forced_market_calls(),
            vec![
                (MarketCategory::Top100, 1, 10),
                (MarketCategory::Top100, 2, 10)
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Err(FetchError::Http { status: 500 }));
        let feed = feed(&source);

        feed.refresh().await;
        assert_eq!(
            feed.state().await,
            Loadable::Failed(FetchError::Http { status: 500 })
        );
        assert!(!feed.load_more_if_needed("c0").await);
    }

    #[tokio::test]
    async fn test_load_more_outside_window_is_noop() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(coins(10, 10)));
        let feed = feed(&source);
        feed.refresh().await;

        // c0 and c1 sit before the last eight items
        assert!(!feed.load_more_if_needed("c1").await);
        assert!(!feed.load_more_if_needed("missing").await);
        assert_eq!(source.market_calls().len(), 1);
        assert_eq!(feed.items().await.len(), 10);
    }

    #[tokio::test]
    async fn test_load_more_at_window_boundary_appends() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(coins(10, 10)));
        let feed = feed(&source);
        feed.refresh().await;

        // c2 is the first item of the trailing window
        assert!(feed.load_more_if_needed("c2").await);
        assert_eq!(feed.items().await.len(), 20);
        assert_eq!(feed.page().await, 2);
        assert_eq!(
            source.market_calls().last(),
            Some(&(MarketCategory::Top100, 2, 10))
        );
    }

    #[tokio::test]
    async fn test_concurrent_load_more_issues_one_fetch() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(coins(10, 10)));
        let feed = feed(&source);
        feed.refresh().await;
        source.set_delay(Duration::from_millis(20));

        let (first, second) = tokio::join!(
            feed.load_more_if_needed("c9"),
            feed.load_more_if_needed("c9")
        );
        assert!(first ^ second);
        assert_eq!(source.market_calls().len(), 2);
        assert_eq!(feed.items().await.len(), 20);
    }

    #[tokio::test]
    async fn test_append_skips_known_ids() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(coins(8, 4)));
        let feed = feed(&source);
        feed.refresh().await;

        feed.load_more_if_needed("c9").await;
        let items = feed.items().await;
        assert_eq!(items.len(), 12);
        assert_eq!(ids(&items[9..]), vec!["c9", "c10", "c11"]);
    }

    #[tokio::test]
    async fn test_empty_page_ends_pagination() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(Vec::new()));
        let feed = feed(&source);
        feed.refresh().await;

        assert!(feed.load_more_if_needed("c9").await);
        assert!(!feed.can_load_more().await);
        assert!(!feed.load_more_if_needed("c9").await);
        assert_eq!(source.market_calls().len(), 2);
        assert_eq!(feed.page().await, 1);
    }

    #[tokio::test]
    async fn test_load_more_failure_keeps_items() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(
            2,
            Err(FetchError::RateLimited {
                retry_after_secs: Some(60),
            }),
        );
        let feed = feed(&source);
        feed.refresh().await;

        assert!(feed.load_more_if_needed("c9").await);
        let state = feed.state().await;
        assert_eq!(state.value().map(Vec::len), Some(10));
        assert!(!feed.can_load_more().await);
        assert!(!feed.load_more_if_needed("c9").await);
    }

    #[tokio::test]
    async fn test_refresh_resets_pagination() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(Vec::new()));
        let feed = feed(&source);
        feed.refresh().await;
        feed.load_more_if_needed("c9").await;
        assert!(!feed.can_load_more().await);

        feed.refresh().await;
        assert!(feed.can_load_more().await);
        assert_eq!(feed.items().await.len(), 10);
        assert_eq!(feed.page().await, 1);
    }

    #[tokio::test]
    async fn test_refresh_discards_stale_load_more() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(coins(100, 10)));
        let feed = feed(&source);
        feed.refresh().await;
        source.set_delay(Duration::from_millis(20));

        let (loaded, ()) = tokio::join!(feed.load_more_if_needed("c9"), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            feed.refresh().await;
        });
        assert!(loaded);
        let items = feed.items().await;
        assert_eq!(ids(&items), ids(&coins(0, 10)));
        assert!(!feed.is_fetching().await);
    }

    #[tokio::test]
    async fn test_apply_filter() {
        let source = Arc::new(MockSource::new());
        source.set_page(
            1,
            Ok(vec![
                coin("bitcoin", "Bitcoin", "BTC"),
                coin("ethereum", "Ethereum", "ETH"),
            ]),
        );
        let feed = feed(&source);
        feed.refresh().await;

        let visible = feed.apply_filter("btc").await;
        assert_eq!(ids(&visible), vec!["bitcoin"]);
        assert_eq!(feed.state().await.value().map(Vec::len), Some(1));

        let visible = feed.apply_filter("  ETHER ").await;
        assert_eq!(ids(&visible), vec!["ethereum"]);

        let visible = feed.apply_filter("").await;
        assert_eq!(ids(&visible), vec!["bitcoin", "ethereum"]);
        assert_eq!(source.market_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_filter_applies_to_later_pages() {
        let source = Arc::new(MockSource::new());
        source.set_page(1, Ok(coins(0, 10)));
        source.set_page(2, Ok(vec![coin("bitcoin", "Bitcoin", "BTC")]));
        let feed = feed(&source);
        feed.refresh().await;

        assert!(feed.apply_filter("bit").await.is_empty());
        // the visible list is empty, but the trailing window is measured on
        // the accumulated items
        assert!(feed.load_more_if_needed("c9").await);
        assert_eq!(
            ids(feed.state().await.value().unwrap()),
            vec!["bitcoin".to_string()]
        );
    }

    #[tokio::test]
    async fn test_filter_before_load_is_kept() {
        let source = Arc::new(MockSource::new());
        source.set_page(
            1,
            Ok(vec![
                coin("bitcoin", "Bitcoin", "BTC"),
                coin("ethereum", "Ethereum", "ETH"),
            ]),
        );
        let feed = feed(&source);

        assert!(feed.apply_filter("eth").await.is_empty());
        feed.refresh().await;
        assert_eq!(
            ids(feed.state().await.value().unwrap()),
            vec!["ethereum".to_string()]
        );
    }
}
