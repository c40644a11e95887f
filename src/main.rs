// =============================================================================
// Aurora Market Cache -- Service Entry Point
// =============================================================================
//
// Builds the process-wide cache, starts the background sweeper and a periodic
// stats reporter, then waits for Ctrl+C. Exchange gateways and the HTTP layer
// attach to the same `Arc<MarketDataCache>`.
// =============================================================================

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aurora_market_cache::{CacheConfig, MarketDataCache, PeriodicTask};

const DEFAULT_CONFIG_PATH: &str = "cache_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("AURORA_CACHE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let mut config = CacheConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load cache config, using defaults");
        CacheConfig::default()
    });
    config.apply_env();

    // ── 2. Build the cache ───────────────────────────────────────────────
    let cache = Arc::new(MarketDataCache::from_config(&config));
    info!(
        instance = %cache.id(),
        ticker_ttl_ms = config.ticker_ttl_ms,
        candle_ttl_ms = config.candle_ttl_ms,
        orderbook_ttl_ms = config.orderbook_ttl_ms,
        "Market data cache ready"
    );

    // ── 3. Background tasks ──────────────────────────────────────────────
    let sweeper = cache.start_cleanup_task(config.cleanup_interval());

    let stats_cache = cache.clone();
    let reporter = PeriodicTask::spawn("cache-stats", config.cleanup_interval(), move || {
        let stats = stats_cache.stats();
        info!(
            tickers = stats.tickers.entries,
            candles = stats.candles.entries,
            order_books = stats.order_books.entries,
            "cache stats"
        );
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping gracefully");

    reporter.shutdown().await;
    sweeper.shutdown().await;
    cache.clear();

    info!("Aurora market cache shut down complete.");
    Ok(())
}
