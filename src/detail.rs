//! Detail screen loading: coin detail and price history fetched concurrently

use crate::{
    error::FetchError,
    repository::MarketDataSource,
    types::{CoinDetail, HistoryRange, Loadable, PricePoint},
};
use std::sync::Arc;

/// Independent fetch states for the two halves of a detail screen
#[derive(Debug, Clone, PartialEq)]
pub struct CoinDetailState {
    pub detail: Loadable<CoinDetail>,
    pub history: Loadable<Vec<PricePoint>>,
}

/// Loads detail and history for one coin
pub struct CoinDetailLoader {
    source: Arc<dyn MarketDataSource>,
}

impl CoinDetailLoader {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }

    /// Issues both fetches at once; each half succeeds or fails on its own
    pub async fn load(&self, id: &str, range: HistoryRange) -> CoinDetailState {
        let (detail, history) = futures::future::join(
            self.source.fetch_detail(id),
            self.source.fetch_history(id, range),
        )
        .await;
        Self::state_from(id, range, detail, history)
    }

    /// Same as `load`, but both halves skip the cache read
    pub async fn refresh(&self, id: &str, range: HistoryRange) -> CoinDetailState {
        let (detail, history) = futures::future::join(
            self.source.refresh_detail(id),
            self.source.refresh_history(id, range),
        )
        .await;
        Self::state_from(id, range, detail, history)
    }

    fn state_from(
        id: &str,
        range: HistoryRange,
        detail: Result<CoinDetail, FetchError>,
        history: Result<Vec<PricePoint>, FetchError>,
    ) -> CoinDetailState {
        if let Err(e) = &detail {
            tracing::warn!(id, error = %e, "Detail fetch failed");
        }
        if let Err(e) = &history {
            tracing::warn!(id, range = range.as_days(), error = %e, "History fetch failed");
        }

        CoinDetailState {
            detail: Loadable::from_result(detail),
            history: Loadable::from_result(history),
        }
    }

    /// Reloads only the history half, e.g. after the range selector changes
    pub async fn load_history(&self, id: &str, range: HistoryRange) -> Loadable<Vec<PricePoint>> {
        Loadable::from_result(self.source.fetch_history(id, range).await)
    }
}
