//! Synthetic market data for screening tests.

use std::collections::HashSet;

use chrono::Utc;
use trading_core::types::{Candle, Instrument, Timeframe};
use trading_data::{CandleStore, PriceTable};

use crate::{MarketContext, ScreeningConfig};

/// 60 five-minute candles drifting by `slope` per bar around a 0.3 zigzag.
/// The last candle trades `last_volume` against 1000 for the rest.
pub fn zigzag(slope: f64, last_volume: f64) -> Vec<Candle> {
    (0..60)
        .map(|i| {
            let wiggle = if i % 2 == 0 { 0.3 } else { -0.3 };
            let close = 100.0 + slope * i as f64 + wiggle;
            let volume = if i == 59 { last_volume } else { 1000.0 };
            Candle::new(i * 300_000, Timeframe::Minute5, close, close + 0.4, close - 0.4, close, volume)
        })
        .collect()
}

/// Context with every series bootstrapped and priced at its last close.
pub fn context_for(
    series: &[(&str, Vec<Candle>)],
    universe: &[Instrument],
    reference: Option<&str>,
    held: HashSet<String>,
) -> MarketContext {
    let store = CandleStore::new(Timeframe::Minute5, 500);
    let prices = PriceTable::new();
    for (symbol, bars) in series {
        store.bootstrap(symbol, bars.clone());
        if let Some(last) = bars.last() {
            prices.update(symbol, last.close, last.end_timestamp());
        }
    }
    let config = ScreeningConfig {
        reference_symbol: reference.map(str::to_string),
        ..Default::default()
    };
    MarketContext::build(universe, &store, &prices, &config, held, Utc::now())
}
