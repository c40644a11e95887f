// =============================================================================
// Market Data Cache -- tickers, candles and order books behind one API
// =============================================================================
//
// One SnapshotStore per kind, each with its own TTL and its own lock. Kinds
// never share a key space, so cleanup never has to guess which kind a key
// belongs to.
//
// Lock order when more than one store is held: tickers, candles, order books.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::snapshot_store::SnapshotStore;
use crate::config::CacheConfig;
use crate::market_data::{
    CandleKey, CandleSeriesKey, CandleSnapshot, Interval, OrderBookKey, OrderBookSnapshot,
    Snapshot, TickerKey, TickerSnapshot,
};

pub const DEFAULT_TICKER_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CANDLE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_ORDERBOOK_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

fn ordered(mut book: OrderBookSnapshot) -> OrderBookSnapshot {
    if !book.is_ordered() {
        debug!(exchange = %book.exchange, symbol = %book.symbol, "sorting unordered order book");
        book.sort_levels();
    }
    book
}

/// Entries removed by one sweep pass, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub tickers: usize,
    pub candles: usize,
    pub order_books: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.tickers + self.candles + self.order_books
    }
}

/// Size and TTL of one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// Stored entries, including expired ones not yet swept.
    pub entries: usize,
    pub ttl_ms: u64,
}

/// Serialisable snapshot of the cache for dashboards and logs.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub instance_id: Uuid,
    pub tickers: KindStats,
    pub candles: KindStats,
    pub order_books: KindStats,
    pub at: DateTime<Utc>,
}

fn kind_stats<T: Snapshot>(store: &SnapshotStore<T>) -> KindStats {
    KindStats {
        entries: store.len(),
        ttl_ms: store.ttl().as_millis() as u64,
    }
}

/// In-memory TTL cache for exchange market data.
///
/// Construct one per process and share it via `Arc`. Reads return
/// `Option<Arc<_>>`; absence (never cached, expired, or cleared) is `None`,
/// never an error.
pub struct MarketDataCache {
    id: Uuid,
    tickers: SnapshotStore<TickerSnapshot>,
    candles: SnapshotStore<CandleSnapshot>,
    order_books: SnapshotStore<OrderBookSnapshot>,
}

impl MarketDataCache {
    /// Cache with the default TTLs: tickers 5 min, candles 60 min, order
    /// books 30 s.
    pub fn new() -> Self {
        Self::with_ttls(DEFAULT_TICKER_TTL, DEFAULT_CANDLE_TTL, DEFAULT_ORDERBOOK_TTL)
    }

    pub fn with_ttls(ticker_ttl: Duration, candle_ttl: Duration, orderbook_ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            tickers: SnapshotStore::new(ticker_ttl),
            candles: SnapshotStore::new(candle_ttl),
            order_books: SnapshotStore::new(orderbook_ttl),
        }
    }

    /// Build from configuration. Zero TTLs keep their defaults.
    pub fn from_config(config: &CacheConfig) -> Self {
        let cache = Self::new();
        if !config.ticker_ttl().is_zero() {
            cache.set_ticker_expiry(config.ticker_ttl());
        }
        if !config.candle_ttl().is_zero() {
            cache.set_candle_expiry(config.candle_ttl());
        }
        if !config.orderbook_ttl().is_zero() {
            cache.set_orderbook_expiry(config.orderbook_ttl());
        }
        cache
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // -------------------------------------------------------------------------
    // Tickers
    // -------------------------------------------------------------------------

    pub fn cache_ticker(&self, ticker: TickerSnapshot) {
        self.tickers.put(ticker);
    }

    pub fn get_ticker(&self, exchange: &str, symbol: &str) -> Option<Arc<TickerSnapshot>> {
        self.tickers.get(&TickerKey::new(exchange, symbol))
    }

    /// Every ticker cached for `exchange`; `None` if any of them has expired.
    pub fn get_all_tickers(&self, exchange: &str) -> Option<Vec<Arc<TickerSnapshot>>> {
        self.tickers.get_all_by_exchange(exchange)
    }

    /// Most recently written ticker per symbol, across exchanges.
    pub fn get_latest_tickers(&self) -> Option<Vec<Arc<TickerSnapshot>>> {
        self.tickers.get_latest_all()
    }

    pub fn remove_ticker(&self, exchange: &str, symbol: &str) -> bool {
        self.tickers.remove(&TickerKey::new(exchange, symbol))
    }

    /// Read-through lookup. A failed fetch is returned as-is and not cached.
    pub fn ticker_or_fetch<E, F>(&self, exchange: &str, symbol: &str, fetch: F) -> Result<Arc<TickerSnapshot>, E>
    where
        F: FnOnce() -> Result<TickerSnapshot, E>,
    {
        self.tickers.get_or_fetch(&TickerKey::new(exchange, symbol), fetch)
    }

    /// Ignored when `ttl` is zero.
    pub fn set_ticker_expiry(&self, ttl: Duration) {
        if self.tickers.set_ttl(ttl) {
            info!(ttl_ms = ttl.as_millis() as u64, "ticker expiry updated");
        }
    }

    // -------------------------------------------------------------------------
    // Candles
    // -------------------------------------------------------------------------

    pub fn cache_candle(&self, candle: CandleSnapshot) {
        self.candles.put(candle);
    }

    pub fn get_candle(
        &self,
        exchange: &str,
        symbol: &str,
        interval: Interval,
        open_time: DateTime<Utc>,
    ) -> Option<Arc<CandleSnapshot>> {
        self.candles.get(&CandleKey {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            interval,
            open_time,
        })
    }

    /// The candle with the greatest open time seen for the series.
    pub fn get_latest_candle(
        &self,
        exchange: &str,
        symbol: &str,
        interval: Interval,
    ) -> Option<Arc<CandleSnapshot>> {
        self.candles
            .get_latest(&CandleSeriesKey::new(exchange, symbol, interval))
    }

    pub fn get_all_candles(&self, exchange: &str) -> Option<Vec<Arc<CandleSnapshot>>> {
        self.candles.get_all_by_exchange(exchange)
    }

    /// Latest candle of every cached series.
    pub fn get_latest_candles(&self) -> Option<Vec<Arc<CandleSnapshot>>> {
        self.candles.get_latest_all()
    }

    pub fn remove_candle(
        &self,
        exchange: &str,
        symbol: &str,
        interval: Interval,
        open_time: DateTime<Utc>,
    ) -> bool {
        self.candles.remove(&CandleKey {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            interval,
            open_time,
        })
    }

    pub fn candle_or_fetch<E, F>(&self, key: &CandleKey, fetch: F) -> Result<Arc<CandleSnapshot>, E>
    where
        F: FnOnce() -> Result<CandleSnapshot, E>,
    {
        self.candles.get_or_fetch(key, fetch)
    }

    pub fn set_candle_expiry(&self, ttl: Duration) {
        if self.candles.set_ttl(ttl) {
            info!(ttl_ms = ttl.as_millis() as u64, "candle expiry updated");
        }
    }

    // -------------------------------------------------------------------------
    // Order books
    // -------------------------------------------------------------------------

    /// Store a depth snapshot. Books whose sides are out of top-of-book order
    /// are sorted before they are indexed.
    pub fn cache_order_book(&self, book: OrderBookSnapshot) {
        self.order_books.put(ordered(book));
    }

    pub fn get_order_book(&self, exchange: &str, symbol: &str) -> Option<Arc<OrderBookSnapshot>> {
        self.order_books.get(&OrderBookKey::new(exchange, symbol))
    }

    pub fn get_all_order_books(&self, exchange: &str) -> Option<Vec<Arc<OrderBookSnapshot>>> {
        self.order_books.get_all_by_exchange(exchange)
    }

    pub fn get_latest_order_books(&self) -> Option<Vec<Arc<OrderBookSnapshot>>> {
        self.order_books.get_latest_all()
    }

    pub fn remove_order_book(&self, exchange: &str, symbol: &str) -> bool {
        self.order_books.remove(&OrderBookKey::new(exchange, symbol))
    }

    pub fn order_book_or_fetch<E, F>(
        &self,
        exchange: &str,
        symbol: &str,
        fetch: F,
    ) -> Result<Arc<OrderBookSnapshot>, E>
    where
        F: FnOnce() -> Result<OrderBookSnapshot, E>,
    {
        self.order_books
            .get_or_fetch(&OrderBookKey::new(exchange, symbol), || fetch().map(ordered))
    }

    pub fn set_orderbook_expiry(&self, ttl: Duration) {
        if self.order_books.set_ttl(ttl) {
            info!(ttl_ms = ttl.as_millis() as u64, "orderbook expiry updated");
        }
    }

    // -------------------------------------------------------------------------
    // Whole-cache operations
    // -------------------------------------------------------------------------

    /// Empty all three stores. All write locks are taken before anything is
    /// reset, so no reader sees a half-cleared cache.
    pub fn clear(&self) {
        let mut tickers = self.tickers.lock();
        let mut candles = self.candles.lock();
        let mut order_books = self.order_books.lock();
        tickers.reset();
        candles.reset();
        order_books.reset();
        drop((tickers, candles, order_books));
        info!(instance = %self.id, "market data cache cleared");
    }

    /// One sweep pass: each store is locked once and its expired entries are
    /// removed through the same path as an explicit remove.
    pub fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Instant::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: Instant) -> SweepReport {
        let report = SweepReport {
            tickers: self.tickers.sweep_expired_at(now),
            candles: self.candles.sweep_expired_at(now),
            order_books: self.order_books.sweep_expired_at(now),
        };

        if report.total() > 0 {
            info!(
                instance = %self.id,
                tickers = report.tickers,
                candles = report.candles,
                order_books = report.order_books,
                "expired cache entries removed"
            );
        } else {
            debug!(instance = %self.id, "cache sweep found nothing to remove");
        }
        report
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            instance_id: self.id,
            tickers: kind_stats(&self.tickers),
            candles: kind_stats(&self.candles),
            order_books: kind_stats(&self.order_books),
            at: Utc::now(),
        }
    }
}

impl Default for MarketDataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MarketDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataCache")
            .field("id", &self.id)
            .field("tickers", &self.tickers.len())
            .field("candles", &self.candles.len())
            .field("order_books", &self.order_books.len())
            .finish()
    }
}
