use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Snapshot, SnapshotKind};

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

/// Depth snapshot for a single symbol. Bids are ordered by descending price,
/// asks by ascending price, so index 0 is always the top of book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub exchange: String,
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub timestamp: DateTime<Utc>,
    /// Exchange update id, when the venue provides one.
    #[serde(default)]
    pub sequence: Option<u64>,
}

impl OrderBookSnapshot {
    /// Build a snapshot, sorting both sides into top-of-book order.
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut book = Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            bids,
            asks,
            timestamp,
            sequence: None,
        };
        book.sort_levels();
        book
    }

    /// Put both sides into top-of-book order. Needed for books built by
    /// struct literal or deserialised from the wire.
    pub fn sort_levels(&mut self) {
        self.bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.total_cmp(&b.price));
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// `true` when bids are non-increasing and asks non-decreasing in price.
    pub fn is_ordered(&self) -> bool {
        self.bids
            .windows(2)
            .all(|w| w[0].price.total_cmp(&w[1].price) != Ordering::Less)
            && self
                .asks
                .windows(2)
                .all(|w| w[0].price.total_cmp(&w[1].price) != Ordering::Greater)
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid_price(&self) -> Option<f64> {
        Some((self.best_bid()? + self.best_ask()?) / 2.0)
    }

    /// Spread in basis points of the mid price.
    pub fn spread_bps(&self) -> Option<f64> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        let mid = (bid + ask) / 2.0;
        if mid > 0.0 {
            Some(((ask - bid) / mid) * 10_000.0)
        } else {
            None
        }
    }

    /// Total resting quantity on the bid side.
    pub fn bid_depth(&self) -> f64 {
        self.bids.iter().map(|l| l.quantity).sum()
    }

    /// Total resting quantity on the ask side.
    pub fn ask_depth(&self) -> f64 {
        self.asks.iter().map(|l| l.quantity).sum()
    }

    /// Depth imbalance in [-1, +1]; positive means more bid quantity.
    pub fn imbalance(&self) -> f64 {
        let (bid_depth, ask_depth) = (self.bid_depth(), self.ask_depth());
        let total = bid_depth + ask_depth;
        if total > 0.0 {
            (bid_depth - ask_depth) / total
        } else {
            0.0
        }
    }
}

/// Primary key of an order book: `(exchange, symbol)`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrderBookKey {
    pub exchange: String,
    pub symbol: String,
}

impl OrderBookKey {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for OrderBookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

impl Snapshot for OrderBookSnapshot {
    type Key = OrderBookKey;
    type LatestKey = String;

    const KIND: SnapshotKind = SnapshotKind::OrderBook;

    fn key(&self) -> OrderBookKey {
        OrderBookKey::new(self.exchange.as_str(), self.symbol.as_str())
    }

    fn exchange(&self) -> &str {
        &self.exchange
    }

    fn latest_key(&self) -> String {
        self.symbol.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            "mexc",
            "BTCUSDT",
            vec![PriceLevel::new(49_800.0, 2.0), PriceLevel::new(49_900.0, 1.5)],
            vec![PriceLevel::new(50_100.0, 2.5), PriceLevel::new(50_000.0, 1.0)],
            Utc::now(),
        )
    }

    #[test]
    fn new_sorts_sides_into_top_of_book_order() {
        let book = sample_book();
        assert!(book.is_ordered());
        assert_eq!(book.best_bid(), Some(49_900.0));
        assert_eq!(book.best_ask(), Some(50_000.0));
    }

    #[test]
    fn deserialised_book_can_be_sorted_in_place() {
        let json = r#"{
            "exchange": "mexc",
            "symbol": "BTCUSDT",
            "bids": [{"price": 1.0, "quantity": 1.0}, {"price": 2.0, "quantity": 1.0}],
            "asks": [{"price": 4.0, "quantity": 1.0}, {"price": 3.0, "quantity": 1.0}],
            "timestamp": "2024-03-01T12:00:00Z"
        }"#;
        let mut book: OrderBookSnapshot = serde_json::from_str(json).unwrap();
        assert!(!book.is_ordered());

        book.sort_levels();
        assert!(book.is_ordered());
        assert_eq!(book.best_bid(), Some(2.0));
        assert_eq!(book.best_ask(), Some(3.0));
    }

    #[test]
    fn derived_metrics() {
        let book = sample_book();
        let mid = book.mid_price().unwrap();
        assert!((mid - 49_950.0).abs() < 1e-9);

        let spread = book.spread_bps().unwrap();
        assert!((spread - (100.0 / 49_950.0) * 10_000.0).abs() < 1e-9);

        // 3.5 bid vs 3.5 ask.
        assert!(book.imbalance().abs() < 1e-12);
    }

    #[test]
    fn empty_book_has_no_top_of_book() {
        let book = OrderBookSnapshot::new("mexc", "XYZUSDT", vec![], vec![], Utc::now());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.spread_bps(), None);
        assert!(book.imbalance().abs() < f64::EPSILON);
        assert!(book.is_ordered());
    }

    #[test]
    fn key_shares_shape_with_ticker_but_not_type() {
        let book = sample_book().with_sequence(42);
        assert_eq!(book.sequence, Some(42));
        assert_eq!(book.key().to_string(), "mexc:BTCUSDT");
    }
}
