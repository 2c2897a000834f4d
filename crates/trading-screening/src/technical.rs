//! Technical screen: trend, volatility band, participation and RSI.

use trading_core::traits::{CandleIndicator, Indicator};
use trading_core::types::{closes, Signal};
use trading_indicators::{relative_volume, Atr, Rsi};
use uuid::Uuid;

use crate::{Candidate, MarketContext, ScreeningConfig, ScreeningLayer};

/// Tag carried by signals from this screen.
const SIGNAL_TAG: &str = "intraday_trend";

/// Scores trend-following candidates and prices their stop and target in ATRs.
pub struct TechnicalScreen {
    config: ScreeningConfig,
}

impl TechnicalScreen {
    pub fn new(config: ScreeningConfig) -> Self {
        Self { config }
    }

    /// Composite score: each term is 1.0 at its threshold.
    fn score(&self, trend: f64, rel_volume: f64, atr_pct: f64, rsi: f64) -> f64 {
        let trend_term = trend.abs() / self.config.min_trend_strength_pct;
        let volume_term = rel_volume / self.config.min_relative_volume;
        let mid = (self.config.min_atr_pct + self.config.max_atr_pct) / 2.0;
        let half = (self.config.max_atr_pct - self.config.min_atr_pct) / 2.0;
        let band_term = 1.0 - ((atr_pct - mid).abs() / half).min(1.0);
        let rsi_term = 1.0 - ((rsi - 50.0).abs() / 50.0).min(1.0);
        trend_term + volume_term + band_term + rsi_term
    }
}

impl ScreeningLayer for TechnicalScreen {
    fn name(&self) -> &'static str {
        "technical"
    }

    fn apply(&self, candidate: &mut Candidate<'_>, ctx: &MarketContext) -> Result<(), String> {
        let config = &self.config;

        if candidate.trend.abs() < config.min_trend_strength_pct {
            return Err(format!(
                "trend {:.2}% below {:.2}%",
                candidate.trend, config.min_trend_strength_pct
            ));
        }

        let atr_indicator = Atr::new(config.atr_period);
        let atr = atr_indicator
            .last(candidate.candles)
            .ok_or_else(|| "ATR unavailable".to_string())?;
        let atr_pct = atr_indicator
            .percent_of_price(candidate.candles)
            .ok_or_else(|| "ATR unavailable".to_string())?;
        if atr_pct < config.min_atr_pct || atr_pct > config.max_atr_pct {
            return Err(format!(
                "ATR {:.2}% outside [{:.2}, {:.2}]",
                atr_pct, config.min_atr_pct, config.max_atr_pct
            ));
        }

        let rel_volume = relative_volume(&candidate.completed(), config.volume_lookback)
            .ok_or_else(|| "relative volume unavailable".to_string())?;
        if rel_volume < config.min_relative_volume {
            return Err(format!(
                "relative volume {:.2} below {:.2}",
                rel_volume, config.min_relative_volume
            ));
        }

        let rsi = Rsi::new(config.rsi_period)
            .last(&closes(candidate.candles))
            .ok_or_else(|| "RSI unavailable".to_string())?;
        let sign = candidate.direction.sign();
        if sign > 0.0 && rsi > config.rsi_overbought {
            return Err(format!("RSI {:.1} overbought", rsi));
        }
        if sign < 0.0 && rsi < config.rsi_oversold {
            return Err(format!("RSI {:.1} oversold", rsi));
        }

        let entry = candidate
            .candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| "no candles".to_string())?;

        candidate.signal = Some(Signal {
            id: Uuid::new_v4(),
            symbol: candidate.instrument.symbol.clone(),
            sector: candidate.instrument.sector.clone(),
            direction: candidate.direction,
            entry_price: entry,
            stop_loss: entry - sign * atr * config.stop_atr_multiple,
            target: entry + sign * atr * config.target_atr_multiple,
            score: self.score(candidate.trend, rel_volume, atr_pct, rsi),
            atr,
            generated_at: ctx.built_at,
            tag: SIGNAL_TAG.to_string(),
        });
        Ok(())
    }
}
