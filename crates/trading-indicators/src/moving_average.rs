//! Moving average indicators.

use trading_core::traits::Indicator;

/// Exponential Moving Average (EMA).
///
/// Gives more weight to recent prices using an exponential decay.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    multiplier: f64,
}

impl Ema {
    /// Create a new EMA with the specified period. A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        let multiplier = 2.0 / (period as f64 + 1.0);
        Self { period, multiplier }
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Vec<f64> {
        if data.len() < self.period {
            return vec![];
        }

        let mut result = Vec::with_capacity(data.len() - self.period + 1);

        // Initialize with SMA
        let initial_sma: f64 = data[..self.period].iter().sum::<f64>() / self.period as f64;
        result.push(initial_sma);

        let mut ema = initial_sma;
        let one_minus_mult = 1.0 - self.multiplier;

        for &price in &data[self.period..] {
            ema = price * self.multiplier + ema * one_minus_mult;
            result.push(ema);
        }

        result
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "EMA"
    }
}

/// Trend strength as the percentage spread between a fast and a slow EMA.
///
/// Positive values mean the fast average is above the slow one (uptrend),
/// negative values a downtrend. Returns `None` without enough data.
pub fn trend_strength(closes: &[f64], fast: usize, slow: usize) -> Option<f64> {
    let fast = Ema::new(fast).last(closes)?;
    let slow = Ema::new(slow).last(closes)?;
    if slow == 0.0 {
        return None;
    }
    Some((fast - slow) / slow * 100.0)
}
