//! Candle interval definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interval of an OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    /// 1 minute candles
    #[serde(rename = "1m")]
    Minute1,
    /// 3 minute candles
    #[serde(rename = "3m")]
    Minute3,
    /// 5 minute candles
    #[serde(rename = "5m")]
    #[default]
    Minute5,
    /// 15 minute candles
    #[serde(rename = "15m")]
    Minute15,
    /// 30 minute candles
    #[serde(rename = "30m")]
    Minute30,
    /// 1 hour candles
    #[serde(rename = "1h")]
    Hour1,
    /// Daily candles
    #[serde(rename = "1d")]
    Daily,
}

impl Timeframe {
    /// Get the duration of the interval in seconds.
    pub fn as_secs(&self) -> u64 {
        match self {
            Timeframe::Minute1 => 60,
            Timeframe::Minute3 => 180,
            Timeframe::Minute5 => 300,
            Timeframe::Minute15 => 900,
            Timeframe::Minute30 => 1800,
            Timeframe::Hour1 => 3600,
            Timeframe::Daily => 86400,
        }
    }

    /// Get the duration of the interval in milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.as_secs() as i64 * 1000
    }

    /// Start of the interval bucket containing `timestamp_ms`.
    ///
    /// Buckets are aligned to the Unix epoch, so a 5 minute bucket always
    /// starts on a multiple of 300 seconds.
    pub fn bucket_start(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.as_millis())
    }

    /// Interval code used by the market API.
    pub fn api_code(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "ONE_MINUTE",
            Timeframe::Minute3 => "THREE_MINUTE",
            Timeframe::Minute5 => "FIVE_MINUTE",
            Timeframe::Minute15 => "FIFTEEN_MINUTE",
            Timeframe::Minute30 => "THIRTY_MINUTE",
            Timeframe::Hour1 => "ONE_HOUR",
            Timeframe::Daily => "ONE_DAY",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute3 => "3m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Daily => "1d",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" | "minute" => Ok(Timeframe::Minute1),
            "3m" | "3min" => Ok(Timeframe::Minute3),
            "5m" | "5min" => Ok(Timeframe::Minute5),
            "15m" | "15min" => Ok(Timeframe::Minute15),
            "30m" | "30min" => Ok(Timeframe::Minute30),
            "1h" | "1hour" | "hour" => Ok(Timeframe::Hour1),
            "1d" | "day" | "daily" => Ok(Timeframe::Daily),
            _ => Err(format!("Invalid timeframe: {}", s)),
        }
    }
}
