//! Regime filter: trade with the index and the sector, not against them.

use crate::{Candidate, MarketContext, ScreeningConfig, ScreeningLayer};

/// Rejects candidates whose direction fights the reference index trend or
/// their sector's average trend beyond the configured tolerances.
pub struct RegimeFilter {
    config: ScreeningConfig,
}

impl RegimeFilter {
    pub fn new(config: ScreeningConfig) -> Self {
        Self { config }
    }
}

impl ScreeningLayer for RegimeFilter {
    fn name(&self) -> &'static str {
        "regime"
    }

    fn apply(&self, candidate: &mut Candidate<'_>, ctx: &MarketContext) -> Result<(), String> {
        let sign = candidate.direction.sign();

        if let Some(index) = ctx.reference_trend {
            if sign * index < -self.config.index_tolerance_pct {
                return Err(format!(
                    "{} against index trend {:.2}%",
                    candidate.direction, index
                ));
            }
        }

        if let Some(sector) = ctx.sector_trend(&candidate.instrument.sector) {
            if sign * sector < -self.config.sector_tolerance_pct {
                return Err(format!(
                    "{} against {} sector trend {:.2}%",
                    candidate.direction, candidate.instrument.sector, sector
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading_core::types::{Direction, Instrument};

    fn apply(direction: Direction, index: Option<f64>, sector: Option<f64>) -> Result<(), String> {
        let instrument = Instrument::new("TCS", "NSE", "1", "IT");
        let mut ctx = MarketContext::default();
        ctx.reference_trend = index;
        if let Some(trend) = sector {
            ctx.sector_trends.insert("IT".into(), trend);
        }
        let mut candidate = Candidate {
            instrument: &instrument,
            candles: &[],
            trend: direction.sign() * 0.5,
            direction,
            signal: None,
        };
        RegimeFilter::new(ScreeningConfig::default()).apply(&mut candidate, &ctx)
    }

    #[test]
    fn test_agreeing_regime_passes() {
        assert!(apply(Direction::Long, Some(0.4), Some(0.2)).is_ok());
        assert!(apply(Direction::Short, Some(-0.4), Some(-0.2)).is_ok());
        assert!(apply(Direction::Long, None, None).is_ok());
    }

    #[test]
    fn test_tolerance_boundaries() {
        // Slightly adverse index within 0.1% tolerance
        assert!(apply(Direction::Long, Some(-0.05), None).is_ok());
        assert!(apply(Direction::Long, Some(-0.3), None).unwrap_err().contains("index"));
        assert!(apply(Direction::Short, None, Some(0.5)).unwrap_err().contains("IT sector"));
    }
}
