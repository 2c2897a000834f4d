//! Volatility and volume indicators.

use trading_core::traits::CandleIndicator;
use trading_core::types::Candle;

/// Average True Range (ATR) with Wilder smoothing.
///
/// Measures market volatility from the full candle range including gaps.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
}

impl Atr {
    /// Create a new ATR indicator. Common period is 14.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }

    /// ATR of the last candle as a percentage of its close.
    pub fn percent_of_price(&self, candles: &[Candle]) -> Option<f64> {
        let atr = self.last(candles)?;
        let close = candles.last()?.close;
        if close <= 0.0 {
            return None;
        }
        Some(atr / close * 100.0)
    }
}

impl Default for Atr {
    fn default() -> Self {
        Self::new(14)
    }
}

impl CandleIndicator for Atr {
    type Output = f64;

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.len() < self.period {
            return vec![];
        }

        let true_ranges: Vec<f64> = candles
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let prev_close = if i == 0 { None } else { Some(candles[i - 1].close) };
                c.true_range(prev_close)
            })
            .collect();

        let period_f64 = self.period as f64;
        let mut result = Vec::with_capacity(candles.len() - self.period + 1);
        let mut atr = true_ranges[..self.period].iter().sum::<f64>() / period_f64;
        result.push(atr);

        for &tr in &true_ranges[self.period..] {
            atr = (atr * (period_f64 - 1.0) + tr) / period_f64;
            result.push(atr);
        }

        result
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "ATR"
    }
}

/// Volume of the last candle relative to the average of the `lookback`
/// candles before it.
pub fn relative_volume(candles: &[Candle], lookback: usize) -> Option<f64> {
    if lookback == 0 || candles.len() <= lookback {
        return None;
    }
    let (last, history) = candles.split_last()?;
    let window = &history[history.len() - lookback..];
    let avg = window.iter().map(|c| c.volume).sum::<f64>() / lookback as f64;
    if avg <= 0.0 {
        return None;
    }
    Some(last.volume / avg)
}
