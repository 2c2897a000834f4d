//! OHLCV candles and live price ticks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Timeframe;

/// A single price/volume update from the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Instrument symbol
    pub symbol: String,
    /// Last traded price
    pub price: f64,
    /// Exchange timestamp in Unix milliseconds
    pub timestamp: i64,
    /// Quantity traded since the previous tick
    pub volume: f64,
}

impl PriceTick {
    pub fn new(symbol: impl Into<String>, price: f64, timestamp: i64, volume: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp,
            volume,
        }
    }
}

/// OHLCV candle over a fixed interval.
/// Uses f64 for fast indicator calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Candle interval
    pub interval: Timeframe,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing (or last) price
    pub close: f64,
    /// Trading volume
    pub volume: f64,
    /// False while the interval is still in progress
    pub complete: bool,
}

impl Candle {
    /// Create a finalized candle.
    pub fn new(
        timestamp: i64,
        interval: Timeframe,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            interval,
            open,
            high,
            low,
            close,
            volume,
            complete: true,
        }
    }

    /// Open an in-progress candle from the first tick of its interval.
    pub fn from_tick(tick: &PriceTick, interval: Timeframe) -> Self {
        Self {
            timestamp: interval.bucket_start(tick.timestamp),
            interval,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume,
            complete: false,
        }
    }

    /// Fold a tick belonging to this candle's interval.
    pub fn apply_tick(&mut self, tick: &PriceTick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume += tick.volume;
    }

    /// End timestamp (exclusive) of the interval.
    #[inline]
    pub fn end_timestamp(&self) -> i64 {
        self.timestamp + self.interval.as_millis()
    }

    /// Calculate the typical price (HLC average).
    #[inline]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Calculate the candle's range (high - low).
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Check if the candle is bullish (close > open).
    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Get the timestamp as a DateTime.
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }

    /// Calculate the true range (used for ATR).
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(pc) => {
                let hl = self.high - self.low;
                let hc = (self.high - pc).abs();
                let lc = (self.low - pc).abs();
                hl.max(hc).max(lc)
            }
            None => self.high - self.low,
        }
    }
}

/// Extract close prices from a candle slice.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_calculations() {
        let candle = Candle::new(0, Timeframe::Minute5, 100.0, 110.0, 95.0, 105.0, 1000.0);

        assert!((candle.typical_price() - 103.333333).abs() < 0.001);
        assert!((candle.range() - 15.0).abs() < 0.001);
        assert!(candle.is_bullish());
        assert_eq!(candle.end_timestamp(), 300_000);
        assert!((candle.true_range(Some(90.0)) - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_candle_from_ticks() {
        let first = PriceTick::new("INFY", 100.0, 301_000, 10.0);
        let mut candle = Candle::from_tick(&first, Timeframe::Minute5);
        assert_eq!(candle.timestamp, 300_000);
        assert!(!candle.complete);

        candle.apply_tick(&PriceTick::new("INFY", 103.0, 302_000, 5.0));
        candle.apply_tick(&PriceTick::new("INFY", 99.0, 303_000, 5.0));

        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.high, 103.0);
        assert_eq!(candle.low, 99.0);
        assert_eq!(candle.close, 99.0);
        assert_eq!(candle.volume, 20.0);
    }
}
