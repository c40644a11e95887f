use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Snapshot, SnapshotKind};

/// 24h rolling ticker for one symbol on one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub exchange: String,
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub high_24h: f64,
    #[serde(default)]
    pub low_24h: f64,
    #[serde(default)]
    pub price_change: f64,
    #[serde(default)]
    pub percent_change: f64,
    pub timestamp: DateTime<Utc>,
}

impl TickerSnapshot {
    /// Ticker with only a last price set; the 24h statistics start at zero.
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>, price: f64) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            price,
            volume: 0.0,
            high_24h: 0.0,
            low_24h: 0.0,
            price_change: 0.0,
            percent_change: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Primary key of a ticker: `(exchange, symbol)`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TickerKey {
    pub exchange: String,
    pub symbol: String,
}

impl TickerKey {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for TickerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

impl Snapshot for TickerSnapshot {
    type Key = TickerKey;
    /// Latest ticker per symbol across all exchanges.
    type LatestKey = String;

    const KIND: SnapshotKind = SnapshotKind::Ticker;

    fn key(&self) -> TickerKey {
        TickerKey::new(self.exchange.as_str(), self.symbol.as_str())
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

    #[test]
    fn key_display_is_exchange_colon_symbol() {
        let t = TickerSnapshot::new("mexc", "BTCUSDT", 50_000.0);
        assert_eq!(t.key().to_string(), "mexc:BTCUSDT");
        assert_eq!(t.latest_key(), "BTCUSDT");
    }

    #[test]
    fn deserialise_fills_missing_stats() {
        let json = r#"{
            "exchange": "mexc",
            "symbol": "ETHUSDT",
            "price": 3000.0,
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let t: TickerSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(t.symbol, "ETHUSDT");
        assert!((t.price - 3000.0).abs() < f64::EPSILON);
        assert!(t.volume.abs() < f64::EPSILON);
    }
}
