//! One-shot local search over the top of the market

use crate::{
    constants::{MIN_SEARCH_LEN, SEARCH_HISTORY_LEN, SEARCH_PAGE_SIZE},
    pagination::filter_coins,
    repository::MarketDataSource,
    types::{Loadable, MarketCategory, MarketCoin},
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Searches the first `SEARCH_PAGE_SIZE` coins by market cap and remembers
/// recent successful queries.
pub struct MarketSearch {
    source: Arc<dyn MarketDataSource>,
    history: Mutex<VecDeque<String>>,
}

impl MarketSearch {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self {
            source,
            history: Mutex::new(VecDeque::with_capacity(SEARCH_HISTORY_LEN)),
        }
    }

    /// Runs a search. Queries shorter than `MIN_SEARCH_LEN` characters
    /// (after trimming) return `Idle` without touching the network.
    pub async fn search(&self, query: &str) -> Loadable<Vec<MarketCoin>> {
        self.run(query, false).await
    }

    /// Like `search`, but re-fetches the coin list instead of reading the
    /// cached copy
    pub async fn refresh(&self, query: &str) -> Loadable<Vec<MarketCoin>> {
        self.run(query, true).await
    }

    async fn run(&self, query: &str, force_network: bool) -> Loadable<Vec<MarketCoin>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Loadable::Idle;
        }

        let result = if force_network {
            self.source
                .refresh_market(MarketCategory::Top100, 1, SEARCH_PAGE_SIZE)
                .await
        } else {
            self.source
                .fetch_market(MarketCategory::Top100, 1, SEARCH_PAGE_SIZE)
                .await
        };
        match result {
            Ok(coins) => {
                self.remember(query).await;
                Loadable::Loaded(filter_coins(&coins, query))
            }
            Err(e) => {
                tracing::warn!(query, error = %e, "Search failed");
                Loadable::Failed(e)
            }
        }
    }

    /// Recent queries, most recent first
    pub async fn history(&self) -> Vec<String> {
        self.history.lock().await.iter().cloned().collect()
    }

    async fn remember(&self, query: &str) {
        let mut history = self.history.lock().await;
        let lowered = query.to_lowercase();
        history.retain(|q| q.to_lowercase() != lowered);
        history.push_front(query.to_string());
        history.truncate(SEARCH_HISTORY_LEN);
    }
}
