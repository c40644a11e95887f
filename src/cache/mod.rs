pub mod expiring_cell;
pub mod market_data_cache;
pub mod snapshot_store;
pub mod sweeper;

pub use expiring_cell::ExpiringCell;
pub use market_data_cache::{
    CacheStats, KindStats, MarketDataCache, SweepReport, DEFAULT_CANDLE_TTL,
    DEFAULT_CLEANUP_INTERVAL, DEFAULT_ORDERBOOK_TTL, DEFAULT_TICKER_TTL,
};
pub use snapshot_store::SnapshotStore;
pub use sweeper::{spawn_with_shutdown, PeriodicTask};
