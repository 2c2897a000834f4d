//! Screening thresholds.

use serde::{Deserialize, Serialize};
use trading_core::error::{TradingError, TradingResult};

/// Configuration for the screening pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Candles per instrument fed to the indicators
    pub lookback_candles: usize,
    /// Index whose trend gates every direction, if it is part of the universe
    pub reference_symbol: Option<String>,
    /// Fast EMA period for trend strength
    pub fast_ema: usize,
    /// Slow EMA period for trend strength
    pub slow_ema: usize,
    pub atr_period: usize,
    pub rsi_period: usize,
    /// Completed candles averaged for relative volume
    pub volume_lookback: usize,
    /// Allow short signals
    pub allow_short: bool,

    /// Tolerated adverse index trend, in percent
    pub index_tolerance_pct: f64,
    /// Tolerated adverse sector average trend, in percent
    pub sector_tolerance_pct: f64,

    /// Minimum absolute EMA spread, in percent
    pub min_trend_strength_pct: f64,
    /// Lower bound of ATR as percent of price
    pub min_atr_pct: f64,
    /// Upper bound of ATR as percent of price
    pub max_atr_pct: f64,
    pub min_relative_volume: f64,
    /// Longs above this RSI are stretched
    pub rsi_overbought: f64,
    /// Shorts below this RSI are stretched
    pub rsi_oversold: f64,
    /// Stop distance in ATRs
    pub stop_atr_multiple: f64,
    /// Target distance in ATRs
    pub target_atr_multiple: f64,

    /// Maximum move between signal entry and the fresh price, in percent
    pub max_price_drift_pct: f64,
    pub strict_trend_strength_pct: f64,
    pub strict_relative_volume: f64,
    pub min_reward_risk: f64,

    /// Signals kept per screening pass
    pub max_candidates: usize,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            lookback_candles: 60,
            reference_symbol: None,
            fast_ema: 9,
            slow_ema: 21,
            atr_period: 14,
            rsi_period: 14,
            volume_lookback: 20,
            allow_short: true,
            index_tolerance_pct: 0.1,
            sector_tolerance_pct: 0.15,
            min_trend_strength_pct: 0.15,
            min_atr_pct: 0.3,
            max_atr_pct: 3.0,
            min_relative_volume: 1.2,
            rsi_overbought: 75.0,
            rsi_oversold: 25.0,
            stop_atr_multiple: 1.5,
            target_atr_multiple: 3.0,
            max_price_drift_pct: 0.5,
            strict_trend_strength_pct: 0.2,
            strict_relative_volume: 1.5,
            min_reward_risk: 1.5,
            max_candidates: 5,
        }
    }
}

impl ScreeningConfig {
    pub fn validate(&self) -> TradingResult<()> {
        if self.fast_ema == 0 || self.fast_ema >= self.slow_ema {
            return Err(TradingError::Config(
                "screening.fast_ema must be positive and below slow_ema".into(),
            ));
        }
        if self.lookback_candles <= self.slow_ema {
            return Err(TradingError::Config(
                "screening.lookback_candles must exceed slow_ema".into(),
            ));
        }
        if self.atr_period == 0 || self.rsi_period == 0 || self.volume_lookback == 0 {
            return Err(TradingError::Config(
                "screening indicator periods must be greater than 0".into(),
            ));
        }
        if !(self.min_atr_pct >= 0.0 && self.min_atr_pct < self.max_atr_pct) {
            return Err(TradingError::Config(
                "screening.min_atr_pct must be below max_atr_pct".into(),
            ));
        }
        if self.stop_atr_multiple <= 0.0 || self.target_atr_multiple <= 0.0 {
            return Err(TradingError::Config(
                "screening ATR multiples must be positive".into(),
            ));
        }
        if self.strict_trend_strength_pct < self.min_trend_strength_pct
            || self.strict_relative_volume < self.min_relative_volume
        {
            return Err(TradingError::Config(
                "execution thresholds must be at least as strict as the technical screen".into(),
            ));
        }
        if self.max_candidates == 0 {
            return Err(TradingError::Config(
                "screening.max_candidates must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Candles needed before an instrument can be screened.
    pub fn warmup_candles(&self) -> usize {
        (self.slow_ema + 1)
            .max(self.atr_period + 1)
            .max(self.rsi_period + 1)
            .max(self.volume_lookback + 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ScreeningConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.warmup_candles(), 22);
    }

    #[test]
    fn test_invalid_configs() {
        let bad_ema = ScreeningConfig {
            fast_ema: 30,
            ..Default::default()
        };
        assert!(bad_ema.validate().is_err());

        let loose_execution = ScreeningConfig {
            strict_relative_volume: 1.0,
            ..Default::default()
        };
        assert!(loose_execution.validate().is_err());

        let no_candidates = ScreeningConfig {
            max_candidates: 0,
            ..Default::default()
        };
        assert!(no_candidates.validate().is_err());
    }
}
