//! Typed endpoint client for the CoinGecko v3 API
//!
//! Builds the request for each logical operation, runs it through the
//! retrying fetcher and maps the snake_case payloads into domain types.
//! Errors from the fetcher are forwarded untouched.

use crate::{
    config::ClientConfig,
    constants::{
        API_KEY_HEADER, COINS_ENDPOINT, DEFAULT_CHANGE_WINDOW, DEFAULT_CURRENCY, MARKETS_ENDPOINT,
        SIMPLE_PRICE_ENDPOINT, TRENDING_ENDPOINT,
    },
    error::FetchError,
    fetcher::RetryingFetcher,
    transport::{HttpRequest, ReqwestTransport},
    types::{CoinDetail, HistoryRange, MarketCoin, PricePoint},
};
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// `/coins/markets` row
#[derive(Debug, Deserialize)]
struct MarketCoinDto {
    id: String,
    symbol: String,
    name: String,
    image: Option<String>,
    current_price: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    sparkline_in_7d: Option<SparklineDto>,
}

#[derive(Debug, Deserialize)]
struct SparklineDto {
    price: Option<Vec<f64>>,
}

impl From<MarketCoinDto> for MarketCoin {
    fn from(dto: MarketCoinDto) -> Self {
        MarketCoin {
            id: dto.id,
            symbol: dto.symbol.to_uppercase(),
            name: dto.name,
            image_url: dto.image,
            current_price: dto.current_price,
            price_change_24h_pct: dto.price_change_percentage_24h,
            market_cap: dto.market_cap,
            total_volume: dto.total_volume,
            sparkline: dto.sparkline_in_7d.and_then(|s| s.price),
        }
    }
}

/// Per-currency amounts; upstream occasionally sends `null` values
type CurrencyMap = HashMap<String, Option<f64>>;

/// `/coins/{id}` payload
#[derive(Debug, Deserialize)]
struct CoinDetailDto {
    id: String,
    symbol: String,
    name: String,
    image: Option<ImageDto>,
    description: Option<DescriptionDto>,
    links: Option<LinksDto>,
    market_data: Option<MarketDataDto>,
}

#[derive(Debug, Deserialize)]
struct ImageDto {
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescriptionDto {
    en: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinksDto {
    homepage: Option<Vec<String>>,
    subreddit_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MarketDataDto {
    current_price: Option<CurrencyMap>,
    market_cap: Option<CurrencyMap>,
    total_volume: Option<CurrencyMap>,
    circulating_supply: Option<f64>,
    total_supply: Option<f64>,
    ath: Option<CurrencyMap>,
    atl: Option<CurrencyMap>,
    price_change_percentage_24h: Option<f64>,
}

fn in_currency(map: &Option<CurrencyMap>, currency: &str) -> Option<f64> {
    map.as_ref().and_then(|m| m.get(currency).copied().flatten())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CoinDetailDto {
    fn into_domain(self, currency: &str) -> CoinDetail {
        let md = self.market_data.unwrap_or_default();
        let links = self.links;

        CoinDetail {
            id: self.id,
            symbol: self.symbol.to_uppercase(),
            name: self.name,
            image_url: self.image.and_then(|i| non_empty(i.large)),
            description: self.description.and_then(|d| non_empty(d.en)),
            homepage_url: links
                .as_ref()
                .and_then(|l| l.homepage.as_ref())
                .and_then(|pages| pages.iter().find(|p| !p.trim().is_empty()).cloned()),
            subreddit_url: links.and_then(|l| non_empty(l.subreddit_url)),
            current_price: in_currency(&md.current_price, currency),
            market_cap: in_currency(&md.market_cap, currency),
            total_volume: in_currency(&md.total_volume, currency),
            circulating_supply: md.circulating_supply,
            total_supply: md.total_supply,
            ath: in_currency(&md.ath, currency),
            atl: in_currency(&md.atl, currency),
            price_change_24h_pct: md.price_change_percentage_24h,
        }
    }
}

/// `/coins/{id}/market_chart` payload: `prices` is `[[timestamp_ms, price], ...]`
#[derive(Debug, Deserialize)]
struct MarketChartDto {
    prices: Vec<Vec<Option<f64>>>,
}

impl MarketChartDto {
    /// Rows with fewer than two usable values are dropped
    fn into_points(self) -> Vec<PricePoint> {
        self.prices
            .into_iter()
            .filter_map(|row| match row.as_slice() {
                [Some(ts), Some(price), ..] => Some(PricePoint::new(*ts as i64, *price)),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TrendingDto {
    #[serde(default)]
    coins: Vec<TrendingItemWrapper>,
}

#[derive(Debug, Deserialize)]
struct TrendingItemWrapper {
    item: TrendingItem,
}

#[derive(Debug, Deserialize)]
struct TrendingItem {
    id: String,
}

/// Parameters for `/coins/markets`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketListQuery {
    pub currency: String,
    /// Upstream sort key, passed through as-is
    pub ordering: String,
    /// 1-based
    pub page: u32,
    pub page_size: u32,
    pub include_sparkline: bool,
    pub change_window: Option<String>,
    /// Restrict the list to these ids
    pub ids: Option<Vec<String>>,
}

impl MarketListQuery {
    /// First page in the default currency with sparkline and 24h change
    pub fn new(ordering: impl Into<String>, page_size: u32) -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            ordering: ordering.into(),
            page: 1,
            page_size,
            include_sparkline: true,
            change_window: Some(DEFAULT_CHANGE_WINDOW.to_string()),
            ids: None,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn sparkline(mut self, include: bool) -> Self {
        self.include_sparkline = include;
        self
    }

    pub fn change_window(mut self, window: Option<String>) -> Self {
        self.change_window = window;
        self
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("vs_currency", self.currency.clone()),
            ("order", self.ordering.clone()),
            ("per_page", self.page_size.to_string()),
            ("page", self.page.to_string()),
            ("sparkline", self.include_sparkline.to_string()),
        ];
        if let Some(window) = &self.change_window {
            params.push(("price_change_percentage", window.clone()));
        }
        if let Some(ids) = &self.ids {
            params.push(("ids", ids.join(",")));
        }
        params
    }
}

/// Typed client over the retrying fetcher
pub struct CoinGeckoClient {
    fetcher: Arc<RetryingFetcher>,
    base_url: Url,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    /// Creates a client with a reqwest transport built from `config`
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        let transport =
            ReqwestTransport::new(config).map_err(|e| FetchError::Transport(e.0))?;
        let fetcher = RetryingFetcher::new(Arc::new(transport), config.retry);
        let client = Self::with_fetcher(Arc::new(fetcher), &config.base_url)?;
        match &config.api_key {
            Some(key) => client.with_api_key(key),
            None => Ok(client),
        }
    }

    /// Creates a client over an existing fetcher
    pub fn with_fetcher(fetcher: Arc<RetryingFetcher>, base_url: &str) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::invalid_request(format!("base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::invalid_request(format!(
                "base URL {} cannot be a base",
                base_url
            )));
        }
        Ok(Self {
            fetcher,
            base_url,
            api_key: None,
        })
    }

    /// Sends `key` in the API key header on every request
    pub fn with_api_key(mut self, key: &str) -> Result<Self, FetchError> {
        HeaderValue::from_str(key)
            .map_err(|e| FetchError::invalid_request(format!("API key header: {}", e)))?;
        self.api_key = Some(key.to_string());
        Ok(self)
    }

    pub fn fetcher(&self) -> &Arc<RetryingFetcher> {
        &self.fetcher
    }

    /// Builds a GET for `path` (plus extra raw segments) with query `params`.
    ///
    /// Segments are percent-encoded, so an id can never escape its path slot.
    fn build_request(
        &self,
        path: &str,
        extra_segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<HttpRequest, FetchError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FetchError::invalid_request("base URL has no path"))?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
            segments.extend(extra_segments);
        }
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        let request = HttpRequest::get(url.to_string());
        Ok(match &self.api_key {
            Some(key) => request.with_header(API_KEY_HEADER, key.as_str()),
            None => request,
        })
    }

    fn require_id(id: &str) -> Result<&str, FetchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(FetchError::invalid_request("coin id must not be empty"));
        }
        Ok(id)
    }

    /// Fetches one page of the market list
    pub async fn market_list(
        &self,
        query: &MarketListQuery,
    ) -> Result<Vec<MarketCoin>, FetchError> {
        let request = self.build_request(MARKETS_ENDPOINT, &[], &query.params())?;
        tracing::debug!(
            ordering = %query.ordering,
            page = query.page,
            page_size = query.page_size,
            "Fetching market list"
        );

        let rows: Vec<MarketCoinDto> = self.fetcher.fetch_json(&request).await?;
        Ok(rows.into_iter().map(MarketCoin::from).collect())
    }

    /// Fetches the detail page for `id`, with amounts in the default currency
    pub async fn coin_detail(&self, id: &str) -> Result<CoinDetail, FetchError> {
        let id = Self::require_id(id)?;
        let params = [
            ("localization", "false".to_string()),
            ("tickers", "false".to_string()),
            ("market_data", "true".to_string()),
            ("community_data", "false".to_string()),
            ("developer_data", "false".to_string()),
            ("sparkline", "false".to_string()),
        ];
        let request = self.build_request(COINS_ENDPOINT, &[id], &params)?;

        let dto: CoinDetailDto = self.fetcher.fetch_json(&request).await?;
        Ok(dto.into_domain(DEFAULT_CURRENCY))
    }

    /// Fetches the price history for `id` over `range`, ascending by time
    pub async fn history_series(
        &self,
        id: &str,
        currency: &str,
        range: HistoryRange,
    ) -> Result<Vec<PricePoint>, FetchError> {
        let id = Self::require_id(id)?;
        let params = [
            ("vs_currency", currency.to_string()),
            ("days", range.as_days().to_string()),
        ];
        let request = self.build_request(COINS_ENDPOINT, &[id, "market_chart"], &params)?;

        let dto: MarketChartDto = self.fetcher.fetch_json(&request).await?;
        Ok(dto.into_points())
    }

    /// Fetches the ids currently on the trending list, in upstream order
    pub async fn trending_ids(&self) -> Result<Vec<String>, FetchError> {
        let request = self.build_request(TRENDING_ENDPOINT, &[], &[])?;
        let dto: TrendingDto = self.fetcher.fetch_json(&request).await?;
        Ok(dto.coins.into_iter().map(|c| c.item.id).collect())
    }

    /// Trending coins with live prices.
    ///
    /// The trending endpoint carries no prices, so its ids are fed into a
    /// market-list call and the rows are returned in trending order. Ids the
    /// market list does not know are dropped.
    pub async fn trending(&self, currency: &str) -> Result<Vec<MarketCoin>, FetchError> {
        let ids = self.trending_ids().await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = MarketListQuery::new("market_cap_desc", ids.len().max(1) as u32)
            .currency(currency)
            .ids(ids.clone());
        let mut by_id: HashMap<String, MarketCoin> = self
            .market_list(&query)
            .await?
            .into_iter()
            .map(|coin| (coin.id.clone(), coin))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Spot prices for `ids` in `currency`.
    ///
    /// Ids the upstream does not price are left out of the map.
    pub async fn simple_price(
        &self,
        ids: &[String],
        currency: &str,
    ) -> Result<HashMap<String, f64>, FetchError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let params = [
            ("ids", ids.join(",")),
            ("vs_currencies", currency.to_string()),
        ];
        let request = self.build_request(SIMPLE_PRICE_ENDPOINT, &[], &params)?;

        let raw: HashMap<String, CurrencyMap> = self.fetcher.fetch_json(&request).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(id, prices)| prices.get(currency).copied().flatten().map(|p| (id, p)))
            .collect())
    }
}
