use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{Snapshot, SnapshotKind};

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

/// Standard kline timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Self::Minute1,
        Self::Minute5,
        Self::Minute15,
        Self::Minute30,
        Self::Hour1,
        Self::Hour4,
        Self::Day1,
        Self::Week1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute1 => "1m",
            Self::Minute5 => "5m",
            Self::Minute15 => "15m",
            Self::Minute30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
            Self::Week1 => "1w",
        }
    }

    /// Length of one candle of this interval.
    pub fn duration(&self) -> Duration {
        let secs = match self {
            Self::Minute1 => 60,
            Self::Minute5 => 5 * 60,
            Self::Minute15 => 15 * 60,
            Self::Minute30 => 30 * 60,
            Self::Hour1 => 60 * 60,
            Self::Hour4 => 4 * 60 * 60,
            Self::Day1 => 24 * 60 * 60,
            Self::Week1 => 7 * 24 * 60 * 60,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|iv| iv.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unsupported candle interval: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSnapshot {
    pub exchange: String,
    pub symbol: String,
    pub interval: Interval,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub quote_volume: f64,
    #[serde(default)]
    pub trade_count: u64,
    /// `false` while the candle is still forming.
    #[serde(default)]
    pub complete: bool,
}

/// Primary key of a candle: `(exchange, symbol, interval, open_time)`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub exchange: String,
    pub symbol: String,
    pub interval: Interval,
    pub open_time: DateTime<Utc>,
}

impl fmt::Display for CandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.exchange,
            self.symbol,
            self.interval,
            self.open_time.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Identifies one candle series: `(exchange, symbol, interval)`. This is the
/// "latest candle" key.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleSeriesKey {
    pub exchange: String,
    pub symbol: String,
    pub interval: Interval,
}

impl CandleSeriesKey {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            interval,
        }
    }
}

impl fmt::Display for CandleSeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.exchange, self.symbol, self.interval)
    }
}

impl Snapshot for CandleSnapshot {
    type Key = CandleKey;
    type LatestKey = CandleSeriesKey;

    const KIND: SnapshotKind = SnapshotKind::Candle;

    fn key(&self) -> CandleKey {
        CandleKey {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            interval: self.interval,
            open_time: self.open_time,
        }
    }

    fn exchange(&self) -> &str {
        &self.exchange
    }

    fn latest_key(&self) -> CandleSeriesKey {
        CandleSeriesKey::new(self.exchange.as_str(), self.symbol.as_str(), self.interval)
    }

    /// The latest pointer only moves forward in open time; late or
    /// out-of-order candles never regress it.
    fn supersedes(&self, current: &Self) -> bool {
        self.open_time > current.open_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_candle(open_time: DateTime<Utc>, close: f64) -> CandleSnapshot {
        CandleSnapshot {
            exchange: "mexc".into(),
            symbol: "BTCUSDT".into(),
            interval: Interval::Hour1,
            open_time,
            close_time: open_time + chrono::Duration::hours(1),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            quote_volume: 200.0,
            trade_count: 50,
            complete: true,
        }
    }

    #[test]
    fn interval_parses_and_displays() {
        for iv in Interval::ALL {
            let parsed: Interval = iv.as_str().parse().unwrap();
            assert_eq!(parsed, iv);
        }
        assert!("2h".parse::<Interval>().is_err());
        assert_eq!(Interval::Hour4.duration(), Duration::from_secs(14_400));
    }

    #[test]
    fn interval_serde_uses_exchange_notation() {
        let json = serde_json::to_string(&Interval::Minute15).unwrap();
        assert_eq!(json, "\"15m\"");
        let iv: Interval = serde_json::from_str("\"1w\"").unwrap();
        assert_eq!(iv, Interval::Week1);
    }

    #[test]
    fn supersedes_only_strictly_later_open_time() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let early = sample_candle(t0, 100.0);
        let late = sample_candle(t0 + chrono::Duration::hours(1), 101.0);
        let same = sample_candle(t0, 102.0);

        assert!(late.supersedes(&early));
        assert!(!early.supersedes(&late));
        assert!(!same.supersedes(&early));
    }

    #[test]
    fn key_display_is_stable() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let c = sample_candle(t0, 100.0);
        assert_eq!(c.key().to_string(), "mexc:BTCUSDT:1h:2024-01-01T12:00:00Z");
        assert_eq!(c.latest_key().to_string(), "mexc:BTCUSDT@1h");
    }
}
