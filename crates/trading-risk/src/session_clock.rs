//! Exchange-local session times: entry window and end-of-day square-off.

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};
use trading_core::error::{TradingError, TradingResult};

/// Session times in exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    offset: FixedOffset,
    market_open: NaiveTime,
    last_entry: NaiveTime,
    square_off: NaiveTime,
}

impl SessionClock {
    /// Build a clock from exchange UTC offset and `HH:MM` times.
    pub fn new(
        utc_offset_minutes: i32,
        market_open: &str,
        last_entry: &str,
        square_off: &str,
    ) -> TradingResult<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            TradingError::Config(format!("Invalid UTC offset: {} minutes", utc_offset_minutes))
        })?;
        let clock = Self {
            offset,
            market_open: parse_time(market_open)?,
            last_entry: parse_time(last_entry)?,
            square_off: parse_time(square_off)?,
        };
        if !(clock.market_open <= clock.last_entry && clock.last_entry <= clock.square_off) {
            return Err(TradingError::Config(format!(
                "Session times out of order: open {} / last entry {} / square-off {}",
                market_open, last_entry, square_off
            )));
        }
        Ok(clock)
    }

    /// A clock that never closes entries nor squares off. Useful in tests.
    pub fn always_open() -> Self {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Self {
            offset: Utc.fix(),
            market_open: NaiveTime::MIN,
            last_entry: end_of_day,
            square_off: end_of_day,
        }
    }

    /// Exchange-local wall-clock time at `now`.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.offset).time()
    }

    /// Whether new positions may be opened at `now`.
    pub fn entries_open(&self, now: DateTime<Utc>) -> bool {
        let t = self.local_time(now);
        t >= self.market_open && t < self.last_entry
    }

    /// Whether every open position must be closed at `now`.
    pub fn square_off_due(&self, now: DateTime<Utc>) -> bool {
        self.local_time(now) >= self.square_off
    }

    pub fn square_off_time(&self) -> NaiveTime {
        self.square_off
    }
}

fn parse_time(value: &str) -> TradingResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| TradingError::Config(format!("Invalid time '{}': {}", value, e)))
}
