//! Constants for the market data SDK
//!
//! Compile-time defaults. `ClientConfig` starts from these and may be
//! overridden from the environment (see `config`).

/// Market data API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Endpoint for paginated market lists
pub const MARKETS_ENDPOINT: &str = "/coins/markets";

/// Endpoint prefix for coin detail and market chart (`/coins/{id}`)
pub const COINS_ENDPOINT: &str = "/coins";

/// Endpoint for the trending list
pub const TRENDING_ENDPOINT: &str = "/search/trending";

/// Endpoint for simple price queries
pub const SIMPLE_PRICE_ENDPOINT: &str = "/simple/price";

/// Header carrying the demo API key, when one is configured
pub const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// HTTP request timeout per attempt (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 20;

/// Total number of attempts the fetcher makes before giving up
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff delay before the first retry (in milliseconds); doubles each retry
pub const INITIAL_BACKOFF_MS: u64 = 400;

/// Default page size for market lists
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// How close to the end of the accumulated list a visible item must be
/// before the next page is requested
pub const TRAILING_WINDOW: usize = 8;

/// Page size used for local search
pub const SEARCH_PAGE_SIZE: u32 = 250;

/// Shortest query `MarketSearch` will act on
pub const MIN_SEARCH_LEN: usize = 2;

/// How many recent search queries are remembered
pub const SEARCH_HISTORY_LEN: usize = 10;

/// Quote currency used by the use-case surface
pub const DEFAULT_CURRENCY: &str = "usd";

/// Change window requested alongside market lists
pub const DEFAULT_CHANGE_WINDOW: &str = "24h";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-data-sdk/0.1.0";
