use market_data_sdk::{ClientConfig, FileCache, HistoryRange, MarketCategory, MarketDataService};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Responses are cached on disk; `load` answers from it, `refresh` does not
    let cache_dir = std::env::temp_dir().join("market-data-sdk-demo");
    let cache = FileCache::open(&cache_dir).await?;
    let config = ClientConfig::from_env();
    let service = MarketDataService::with_cache(&config, Arc::new(cache))?;

    println!("Market feed demo (cache: {})", cache_dir.display());
    println!("-------------------------------------------");

    let feed = service.feed(MarketCategory::Top100);
    let start = Instant::now();
    feed.load().await;
    println!("First page (cache or network) in {:?}", start.elapsed());

    let start = Instant::now();
    feed.refresh().await;
    if let Some(err) = feed.state().await.error() {
        println!("First page failed: {}", err);
        if let Some(wait) = err.retry_after() {
            println!("Server asked us to wait {:?}", wait);
        }
        return Ok(());
    }
    println!("Refreshed first page in {:?}", start.elapsed());

    // Simulate scrolling to the bottom twice
    for _ in 0..2 {
        let items = feed.items().await;
        let Some(last) = items.last() else { break };
        if feed.load_more_if_needed(&last.id).await {
            println!("Loaded page {} ({} coins)", feed.page().await, feed.items().await.len());
        }
    }

    for coin in feed.apply_filter("eth").await.iter().take(5) {
        println!(
            "{:<8} {:<24} ${:>14.4}",
            coin.symbol,
            coin.name,
            coin.current_price.unwrap_or_default()
        );
    }

    let search = service.search();
    if let Some(hits) = search.search("sol").await.value() {
        println!("\nSearch 'sol': {} matches", hits.len());
    }

    let state = service
        .detail_loader()
        .load("bitcoin", HistoryRange::Week)
        .await;
    if let Some(detail) = state.detail.value() {
        println!(
            "\n{} ({}): ATH {:?}, supply {:?}",
            detail.name, detail.symbol, detail.ath, detail.circulating_supply
        );
    }
    if let Some(points) = state.history.value() {
        println!("History points over 7 days: {}", points.len());
    }

    let metrics = service.fetch_metrics().await;
    println!(
        "\nFetches: {} (failed {}, rate limited {}, retries {}), p50 {:.1}ms",
        metrics.total_fetches,
        metrics.failed_fetches,
        metrics.rate_limited_fetches,
        metrics.total_retries,
        metrics.latency_p50_ms
    );

    Ok(())
}
