//! Rolling per-instrument candle series built from history and live ticks.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tracing::trace;
use trading_core::traits::TickSubscriber;
use trading_core::types::{Candle, PriceTick, Timeframe};

/// What a tick did to the series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    /// The open candle absorbed the tick
    Updated,
    /// A new candle was opened, finalizing the previous one if any
    Opened { finalized: Option<Candle> },
    /// The tick was older than the series and was discarded
    DroppedOutOfOrder,
}

#[derive(Debug, Default)]
struct Series {
    closed: VecDeque<Candle>,
    open: Option<Candle>,
    /// Set when the last bootstrap kept at least one historical bar
    history: bool,
    dropped: u64,
}

impl Series {
    fn last_closed_ts(&self) -> Option<i64> {
        self.closed.back().map(|c| c.timestamp)
    }

    fn trim(&mut self, capacity: usize) {
        while self.closed.len() > capacity {
            self.closed.pop_front();
        }
    }

    fn has_candles(&self) -> bool {
        !self.closed.is_empty() || self.open.is_some()
    }
}

/// Thread-safe candle storage for all instruments of a session.
///
/// Each series holds finalized candles in strictly increasing timestamp
/// order plus at most one open candle.
pub struct CandleStore {
    interval: Timeframe,
    capacity: usize,
    series: RwLock<HashMap<String, Series>>,
}

impl CandleStore {
    pub fn new(interval: Timeframe, capacity: usize) -> Self {
        Self {
            interval,
            capacity: capacity.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Timeframe {
        self.interval
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seed a series with historical bars. Returns the number of bars kept.
    pub fn bootstrap(&self, symbol: &str, bars: Vec<Candle>) -> usize {
        self.bootstrap_at(symbol, bars, Utc::now().timestamp_millis())
    }

    /// Seed a series with historical bars as of `now_ms`.
    ///
    /// Bars are sorted and de-duplicated by timestamp. A last bar whose
    /// interval has not ended at `now_ms` becomes the open candle, merged
    /// with a live open candle of the same interval; every other bar is
    /// marked complete. An open candle that is not newer than the last
    /// complete bar is discarded.
    pub fn bootstrap_at(&self, symbol: &str, mut bars: Vec<Candle>, now_ms: i64) -> usize {
        bars.retain(|c| c.close.is_finite());
        bars.sort_by_key(|c| c.timestamp);
        bars.dedup_by_key(|c| c.timestamp);

        let forming = match bars.last() {
            Some(last) if last.end_timestamp() > now_ms => bars.pop().map(|mut c| {
                c.complete = false;
                c
            }),
            _ => None,
        };

        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let series = map.entry(symbol.to_string()).or_default();
        series.closed = bars
            .into_iter()
            .map(|mut c| {
                c.complete = true;
                c
            })
            .collect();

        if let Some(bar) = forming {
            series.open = match series.open {
                Some(live) if live.timestamp == bar.timestamp => Some(Candle {
                    high: bar.high.max(live.high),
                    low: bar.low.min(live.low),
                    close: live.close,
                    volume: bar.volume.max(live.volume),
                    ..bar
                }),
                Some(live) if live.timestamp > bar.timestamp => {
                    series.closed.push_back(Candle { complete: true, ..bar });
                    Some(live)
                }
                _ => Some(bar),
            };
        }
        series.trim(self.capacity);

        if let (Some(open), Some(last)) = (series.open, series.last_closed_ts()) {
            if open.timestamp <= last {
                series.open = None;
            }
        }

        let kept = series.closed.len() + usize::from(forming.is_some());
        series.history = kept > 0;
        kept
    }

    /// Fold a live tick into its series.
    pub fn ingest(&self, tick: &PriceTick) -> IngestOutcome {
        let bucket = self.interval.bucket_start(tick.timestamp);
        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let series = map.entry(tick.symbol.clone()).or_default();

        if !tick.price.is_finite() || tick.price <= 0.0 {
            series.dropped += 1;
            return IngestOutcome::DroppedOutOfOrder;
        }

        match series.open.map(|c| c.timestamp) {
            Some(open_ts) if bucket == open_ts => {
                if let Some(open) = series.open.as_mut() {
                    open.apply_tick(tick);
                }
                IngestOutcome::Updated
            }
            Some(open_ts) if bucket > open_ts => {
                let finished = series.open.take().map(|mut c| {
                    c.complete = true;
                    c
                });
                series.closed.extend(finished);
                series.open = Some(Candle::from_tick(tick, self.interval));
                series.trim(self.capacity);
                IngestOutcome::Opened { finalized: finished }
            }
            Some(_) => {
                series.dropped += 1;
                IngestOutcome::DroppedOutOfOrder
            }
            None => {
                if series.last_closed_ts().is_some_and(|last| bucket <= last) {
                    series.dropped += 1;
                    return IngestOutcome::DroppedOutOfOrder;
                }
                series.open = Some(Candle::from_tick(tick, self.interval));
                IngestOutcome::Opened { finalized: None }
            }
        }
    }

    /// Up to `count` most recent candles, oldest first, open candle last.
    pub fn latest(&self, symbol: &str, count: usize) -> Vec<Candle> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let Some(series) = map.get(symbol) else {
            return Vec::new();
        };

        let open = usize::from(series.open.is_some());
        let from_closed = count.saturating_sub(open).min(series.closed.len());
        let mut out: Vec<Candle> = series
            .closed
            .iter()
            .skip(series.closed.len() - from_closed)
            .copied()
            .collect();
        if count > 0 {
            out.extend(series.open);
        }
        out
    }

    /// Up to `count` most recent finalized candles, oldest first.
    pub fn completed(&self, symbol: &str, count: usize) -> Vec<Candle> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.get(symbol)
            .map(|s| {
                let skip = s.closed.len().saturating_sub(count);
                s.closed.iter().skip(skip).copied().collect()
            })
            .unwrap_or_default()
    }

    /// Close of the most recent finalized candle.
    pub fn last_close(&self, symbol: &str) -> Option<f64> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.get(symbol)
            .and_then(|s| s.closed.back())
            .map(|c| c.close)
    }

    /// True when `symbol` was seeded with at least one historical bar.
    /// Candles built from live ticks alone do not count.
    pub fn has_history(&self, symbol: &str) -> bool {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.get(symbol).is_some_and(|s| s.history)
    }

    pub fn has_candles(&self, symbol: &str) -> bool {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.get(symbol).is_some_and(Series::has_candles)
    }

    /// Number of instruments with at least one candle.
    pub fn symbols_with_candles(&self) -> usize {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|s| s.has_candles()).count()
    }

    pub fn dropped_ticks(&self, symbol: &str) -> u64 {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.get(symbol).map(|s| s.dropped).unwrap_or(0)
    }

    /// Remove every series.
    pub fn clear(&self) {
        self.series
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl TickSubscriber for CandleStore {
    fn on_tick(&self, tick: &PriceTick) {
        if let IngestOutcome::DroppedOutOfOrder = self.ingest(tick) {
            trace!(symbol = %tick.symbol, ts = tick.timestamp, "Out-of-order tick dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60_000;

    fn bar(ts: i64, close: f64) -> Candle {
        Candle::new(ts, Timeframe::Minute5, close, close + 1.0, close - 1.0, close, 100.0)
    }

    fn tick(ts: i64, price: f64) -> PriceTick {
        PriceTick::new("SBIN", price, ts, 10.0)
    }

    #[test]
    fn test_bootstrap_sorts_and_dedups() {
        let store = CandleStore::new(Timeframe::Minute5, 3);
        let kept = store.bootstrap(
            "SBIN",
            vec![bar(10 * MIN, 3.0), bar(0, 1.0), bar(5 * MIN, 2.0), bar(5 * MIN, 2.5), bar(15 * MIN, 4.0)],
        );
        assert_eq!(kept, 3);

        let candles = store.completed("SBIN", 10);
        let ts: Vec<_> = candles.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![5 * MIN, 10 * MIN, 15 * MIN]);
        assert!(candles.iter().all(|c| c.complete));
        assert_eq!(store.last_close("SBIN"), Some(4.0));
    }

    #[test]
    fn test_ticks_build_and_finalize_candles() {
        let store = CandleStore::new(Timeframe::Minute5, 100);
        store.bootstrap("SBIN", vec![bar(0, 100.0)]);

        assert_eq!(
            store.ingest(&tick(5 * MIN + 1_000, 101.0)),
            IngestOutcome::Opened { finalized: None }
        );
        assert_eq!(store.ingest(&tick(6 * MIN, 103.0)), IngestOutcome::Updated);
        assert_eq!(store.ingest(&tick(7 * MIN, 99.5)), IngestOutcome::Updated);

        let latest = store.latest("SBIN", 5);
        assert_eq!(latest.len(), 2);
        let open = latest[1];
        assert!(!open.complete);
        assert_eq!((open.open, open.high, open.low, open.close), (101.0, 103.0, 99.5, 99.5));

        match store.ingest(&tick(10 * MIN, 104.0)) {
            IngestOutcome::Opened { finalized: Some(done) } => {
                assert_eq!(done.timestamp, 5 * MIN);
                assert!(done.complete);
                assert_eq!(done.close, 99.5);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.completed("SBIN", 10).len(), 2);
    }

    #[test]
    fn test_out_of_order_ticks_dropped() {
        let store = CandleStore::new(Timeframe::Minute5, 100);
        store.bootstrap("SBIN", vec![bar(5 * MIN, 100.0)]);

        // Same bucket as the last finalized bar
        assert_eq!(store.ingest(&tick(6 * MIN, 1.0)), IngestOutcome::DroppedOutOfOrder);

        store.ingest(&tick(20 * MIN, 101.0));
        assert_eq!(store.ingest(&tick(12 * MIN, 1.0)), IngestOutcome::DroppedOutOfOrder);
        assert_eq!(store.ingest(&tick(21 * MIN, f64::NAN)), IngestOutcome::DroppedOutOfOrder);
        assert_eq!(store.dropped_ticks("SBIN"), 3);
        assert_eq!(store.latest("SBIN", 1)[0].close, 101.0);
    }

    #[test]
    fn test_bar_still_forming_stays_open() {
        let store = CandleStore::new(Timeframe::Minute5, 100);
        let kept = store.bootstrap_at("SBIN", vec![bar(0, 99.0), bar(5 * MIN, 100.0)], 6 * MIN);
        assert_eq!(kept, 2);
        assert_eq!(store.completed("SBIN", 10).len(), 1);
        assert_eq!(store.last_close("SBIN"), Some(99.0));

        assert_eq!(store.ingest(&tick(6 * MIN, 101.5)), IngestOutcome::Updated);
        let open = store.latest("SBIN", 1)[0];
        assert!(!open.complete);
        assert_eq!(open.timestamp, 5 * MIN);
        assert_eq!((open.high, open.close), (101.5, 101.5));

        match store.ingest(&tick(10 * MIN, 102.0)) {
            IngestOutcome::Opened { finalized: Some(done) } => assert_eq!(done.close, 101.5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_forming_bar_merges_with_live_candle() {
        let store = CandleStore::new(Timeframe::Minute5, 100);
        store.ingest(&tick(5 * MIN + 30_000, 103.0));
        store.bootstrap_at("SBIN", vec![bar(0, 99.0), bar(5 * MIN, 100.0)], 6 * MIN);

        let open = store.latest("SBIN", 1)[0];
        assert!(!open.complete);
        assert_eq!(open.open, 100.0);
        assert_eq!((open.high, open.low, open.close), (103.0, 99.0, 103.0));
    }

    #[test]
    fn test_live_ticks_alone_are_not_history() {
        let store = CandleStore::new(Timeframe::Minute5, 100);
        store.ingest(&tick(MIN, 100.0));
        assert!(store.has_candles("SBIN"));
        assert!(!store.has_history("SBIN"));

        assert_eq!(store.bootstrap("SBIN", Vec::new()), 0);
        assert!(!store.has_history("SBIN"));

        store.bootstrap("INFY", vec![bar(0, 1500.0)]);
        assert!(store.has_history("INFY"));
    }

    #[test]
    fn test_latest_counts() {
        let store = CandleStore::new(Timeframe::Minute5, 100);
        store.bootstrap("SBIN", vec![bar(0, 1.0), bar(5 * MIN, 2.0), bar(10 * MIN, 3.0)]);
        store.ingest(&tick(15 * MIN, 4.0));

        let closes: Vec<_> = store.latest("SBIN", 2).iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![3.0, 4.0]);
        assert!(store.latest("SBIN", 0).is_empty());
        assert!(store.latest("NONE", 5).is_empty());
        assert_eq!(store.symbols_with_candles(), 1);
        assert!(store.has_candles("SBIN"));
        assert!(!store.has_candles("INFY"));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = CandleStore::new(Timeframe::Minute1, 2);
        for i in 0..5 {
            store.ingest(&tick(i * MIN, 100.0 + i as f64));
        }
        let completed = store.completed("SBIN", 10);
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].timestamp, 2 * MIN);
    }

    #[test]
    fn test_random_tick_sequence_keeps_invariants() {
        let store = CandleStore::new(Timeframe::Minute1, 50);
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut ts = 0i64;

        for _ in 0..5_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            // Mostly forward, sometimes jumping back up to three minutes
            let step = (seed % 40_000) as i64 - 8_000;
            ts = (ts + step).max(0);
            let price = 100.0 + (seed % 1_000) as f64 / 100.0;
            store.ingest(&tick(ts, price));

            let series = store.latest("SBIN", 100);
            assert!(series.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            assert!(series.iter().filter(|c| !c.complete).count() <= 1);
            if let Some(open) = series.iter().position(|c| !c.complete) {
                assert_eq!(open, series.len() - 1);
            }
        }
    }
}
