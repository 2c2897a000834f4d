//! Execution validation at a fresh price.

use trading_indicators::relative_volume;

use crate::{Candidate, MarketContext, ScreeningConfig, ScreeningLayer};

/// Stricter re-check just before entry. Re-prices the signal at the
/// latest price when it passes.
pub struct ExecutionValidator {
    config: ScreeningConfig,
}

impl ExecutionValidator {
    pub fn new(config: ScreeningConfig) -> Self {
        Self { config }
    }
}

impl ScreeningLayer for ExecutionValidator {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn apply(&self, candidate: &mut Candidate<'_>, ctx: &MarketContext) -> Result<(), String> {
        let config = &self.config;
        let symbol = candidate.instrument.symbol.as_str();
        let price = ctx
            .price(symbol)
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| "no live price".to_string())?;

        if candidate.trend.abs() < config.strict_trend_strength_pct {
            return Err(format!(
                "trend {:.2}% below strict {:.2}%",
                candidate.trend, config.strict_trend_strength_pct
            ));
        }

        let rel_volume = relative_volume(&candidate.completed(), config.volume_lookback).unwrap_or(0.0);
        if rel_volume < config.strict_relative_volume {
            return Err(format!(
                "relative volume {:.2} below strict {:.2}",
                rel_volume, config.strict_relative_volume
            ));
        }

        let signal = candidate
            .signal
            .as_mut()
            .ok_or_else(|| "no signal to validate".to_string())?;

        let drift_pct = (price - signal.entry_price).abs() / signal.entry_price * 100.0;
        if drift_pct > config.max_price_drift_pct {
            return Err(format!(
                "price drifted {:.2}% from entry (max {:.2}%)",
                drift_pct, config.max_price_drift_pct
            ));
        }

        let sign = signal.direction.sign();
        let risk = sign * (price - signal.stop_loss);
        let reward = sign * (signal.target - price);
        if risk <= 0.0 || reward <= 0.0 {
            return Err("price outside stop/target range".to_string());
        }
        let reward_risk = reward / risk;
        if reward_risk < config.min_reward_risk {
            return Err(format!(
                "reward/risk {:.2} at {:.2} below {:.2}",
                reward_risk, price, config.min_reward_risk
            ));
        }

        signal.entry_price = price;
        Ok(())
    }
}
