//! Market-wide state shared by every instrument of a screening pass.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use trading_core::types::{closes, Candle, Instrument};
use trading_data::{CandleStore, PriceTable};
use trading_indicators::trend_strength;

use crate::ScreeningConfig;

/// Snapshot of candles, prices and trends taken once per screening pass.
#[derive(Debug, Clone, Default)]
pub struct MarketContext {
    /// Trend strength of the reference index, in percent
    pub reference_trend: Option<f64>,
    /// Average trend strength per sector, in percent
    pub sector_trends: HashMap<String, f64>,
    /// Latest prices at build time
    pub prices: HashMap<String, f64>,
    /// Symbols with an open position
    pub held: HashSet<String>,
    pub built_at: DateTime<Utc>,
    candles: HashMap<String, Vec<Candle>>,
}

impl MarketContext {
    /// Build the context for `universe` from the live stores.
    pub fn build(
        universe: &[Instrument],
        candles: &CandleStore,
        prices: &PriceTable,
        config: &ScreeningConfig,
        held: HashSet<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let series: HashMap<String, Vec<Candle>> = universe
            .iter()
            .map(|i| (i.symbol.clone(), candles.latest(&i.symbol, config.lookback_candles)))
            .collect();

        let reference_trend = config.reference_symbol.as_ref().and_then(|symbol| {
            let bars = series
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| candles.latest(symbol, config.lookback_candles));
            trend_strength(&closes(&bars), config.fast_ema, config.slow_ema)
        });

        let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
        for instrument in universe {
            if config.reference_symbol.as_deref() == Some(instrument.symbol.as_str()) {
                continue;
            }
            let Some(bars) = series.get(&instrument.symbol) else {
                continue;
            };
            if let Some(trend) = trend_strength(&closes(bars), config.fast_ema, config.slow_ema) {
                let entry = sums.entry(instrument.sector.as_str()).or_insert((0.0, 0));
                entry.0 += trend;
                entry.1 += 1;
            }
        }
        let sector_trends = sums
            .into_iter()
            .map(|(sector, (sum, n))| (sector.to_string(), sum / n as f64))
            .collect();

        Self {
            reference_trend,
            sector_trends,
            prices: prices.snapshot(),
            held,
            built_at: now,
            candles: series,
        }
    }

    /// Context for a single instrument at the moment of entry: its current
    /// candles and every latest price. No trends are computed.
    pub fn for_entry(
        instrument: &Instrument,
        candles: &CandleStore,
        prices: &PriceTable,
        config: &ScreeningConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let series = HashMap::from([(
            instrument.symbol.clone(),
            candles.latest(&instrument.symbol, config.lookback_candles),
        )]);
        Self::from_parts(series, prices.snapshot(), now)
    }

    /// Assemble a context from precomputed parts.
    pub fn from_parts(
        candles: HashMap<String, Vec<Candle>>,
        prices: HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            prices,
            built_at: now,
            candles,
            ..Default::default()
        }
    }

    pub fn candles(&self, symbol: &str) -> &[Candle] {
        self.candles.get(symbol).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    pub fn sector_trend(&self, sector: &str) -> Option<f64> {
        self.sector_trends.get(sector).copied()
    }

    pub fn is_held(&self, symbol: &str) -> bool {
        self.held.contains(symbol)
    }
}
