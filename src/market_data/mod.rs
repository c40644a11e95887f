// =============================================================================
// Market Data Snapshots -- the three kinds the cache stores
// =============================================================================
//
// Each kind owns a distinct key type, so a ticker key can never be confused
// with an order-book key even when the (exchange, symbol) pair is identical.
// The `Snapshot` trait tells a `SnapshotStore` how to index a kind.
// =============================================================================

pub mod candle;
pub mod orderbook;
pub mod ticker;

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

pub use candle::{CandleKey, CandleSeriesKey, CandleSnapshot, Interval};
pub use orderbook::{OrderBookKey, OrderBookSnapshot, PriceLevel};
pub use ticker::{TickerKey, TickerSnapshot};

/// Which kind of snapshot a store holds. Used for log fields and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Ticker,
    Candle,
    OrderBook,
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticker => write!(f, "ticker"),
            Self::Candle => write!(f, "candle"),
            Self::OrderBook => write!(f, "orderbook"),
        }
    }
}

/// Indexing contract for a cached snapshot kind.
///
/// * `key` is the primary (exact) key.
/// * `exchange` selects the by-exchange bucket.
/// * `latest_key` selects the "latest" bucket; `supersedes` decides whether an
///   incoming entry replaces the one currently recorded there.
pub trait Snapshot: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync;
    type LatestKey: Clone + Eq + Hash + fmt::Debug + Send + Sync;

    const KIND: SnapshotKind;

    fn key(&self) -> Self::Key;

    fn exchange(&self) -> &str;

    fn latest_key(&self) -> Self::LatestKey;

    /// Whether `self` should replace `current` as the latest entry for its
    /// latest key. Most kinds treat the most recent write as the latest.
    fn supersedes(&self, _current: &Self) -> bool {
        true
    }
}
