// =============================================================================
// Aurora Market Cache -- TTL cache for exchange market data
// =============================================================================
//
// Producers (exchange gateways) call `cache_*`; consumers (REST handlers,
// WebSocket broadcasters) call `get_*`. A background sweeper reclaims entries
// that lazy expiry on read only hides.
// =============================================================================

pub mod cache;
pub mod config;
pub mod market_data;

pub use cache::{
    CacheStats, ExpiringCell, MarketDataCache, PeriodicTask, SnapshotStore, SweepReport,
};
pub use config::CacheConfig;
pub use market_data::{
    CandleKey, CandleSeriesKey, CandleSnapshot, Interval, OrderBookKey, OrderBookSnapshot,
    PriceLevel, Snapshot, SnapshotKind, TickerKey, TickerSnapshot,
};
