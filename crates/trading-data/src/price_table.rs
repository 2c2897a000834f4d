//! Latest traded price per instrument.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use trading_core::traits::TickSubscriber;
use trading_core::types::PriceTick;

use crate::CandleStore;

#[derive(Debug, Clone, Copy)]
struct Quote {
    price: f64,
    timestamp: i64,
}

/// Most recent price of every instrument seen on the feed.
#[derive(Debug, Default)]
pub struct PriceTable {
    quotes: RwLock<HashMap<String, Quote>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a price unless a newer one is already known.
    pub fn update(&self, symbol: &str, price: f64, timestamp: i64) -> bool {
        if !price.is_finite() || price <= 0.0 {
            return false;
        }
        let mut quotes = self.quotes.write().unwrap_or_else(PoisonError::into_inner);
        match quotes.get_mut(symbol) {
            Some(quote) if quote.timestamp > timestamp => false,
            Some(quote) => {
                *quote = Quote { price, timestamp };
                true
            }
            None => {
                quotes.insert(symbol.to_string(), Quote { price, timestamp });
                true
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        let quotes = self.quotes.read().unwrap_or_else(PoisonError::into_inner);
        quotes.get(symbol).map(|q| q.price)
    }

    pub fn has_price(&self, symbol: &str) -> bool {
        self.get(symbol).is_some()
    }

    pub fn symbols_with_prices(&self) -> usize {
        self.quotes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Copy of every latest price.
    pub fn snapshot(&self) -> HashMap<String, f64> {
        let quotes = self.quotes.read().unwrap_or_else(PoisonError::into_inner);
        quotes.iter().map(|(s, q)| (s.clone(), q.price)).collect()
    }

    /// Fill missing prices with the latest known close. Returns how many were seeded.
    pub fn seed_from_closes<'a>(
        &self,
        candles: &CandleStore,
        symbols: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let mut seeded = 0;
        for symbol in symbols {
            if self.has_price(symbol) {
                continue;
            }
            let Some(last) = candles.latest(symbol, 1).pop() else {
                continue;
            };
            let as_of = if last.complete { last.end_timestamp() } else { last.timestamp };
            if self.update(symbol, last.close, as_of) {
                seeded += 1;
            }
        }
        seeded
    }

    pub fn clear(&self) {
        self.quotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl TickSubscriber for PriceTable {
    fn on_tick(&self, tick: &PriceTick) {
        self.update(&tick.symbol, tick.price, tick.timestamp);
    }
}
