//! Position sizing algorithms.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Position sizing method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PositionSizingMethod {
    /// Fixed quantity per trade
    Fixed { quantity: Decimal },
    /// Percentage of session capital per position
    PercentCapital { percent: Decimal },
    /// Percentage of session capital at risk between entry and stop
    RiskBased { risk_percent: Decimal },
}

impl Default for PositionSizingMethod {
    fn default() -> Self {
        PositionSizingMethod::RiskBased {
            risk_percent: dec!(1),
        }
    }
}

/// Position sizer calculates the appropriate position size.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    method: PositionSizingMethod,
    max_quantity: Option<Decimal>,
    max_position_value: Option<Decimal>,
}

impl PositionSizer {
    /// Create a new position sizer.
    pub fn new(method: PositionSizingMethod) -> Self {
        Self {
            method,
            max_quantity: None,
            max_position_value: None,
        }
    }

    /// Set maximum quantity per position.
    pub fn with_max_quantity(mut self, max: Decimal) -> Self {
        self.max_quantity = Some(max);
        self
    }

    /// Set maximum position value.
    pub fn with_max_position_value(mut self, max: Decimal) -> Self {
        self.max_position_value = Some(max);
        self
    }

    /// Calculate position size in whole units.
    ///
    /// # Arguments
    /// * `capital` - Session capital
    /// * `available` - Capital not tied up in open positions
    /// * `entry` - Expected entry price
    /// * `stop` - Initial stop-loss price
    pub fn calculate(&self, capital: Decimal, available: Decimal, entry: f64, stop: f64) -> Decimal {
        let Ok(price) = Decimal::try_from(entry) else {
            return Decimal::ZERO;
        };
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let base_size = match &self.method {
            PositionSizingMethod::Fixed { quantity } => *quantity,

            PositionSizingMethod::PercentCapital { percent } => {
                capital * (*percent / dec!(100)) / price
            }

            PositionSizingMethod::RiskBased { risk_percent } => {
                let risk_per_unit = Decimal::try_from((entry - stop).abs()).unwrap_or(Decimal::ZERO);
                if risk_per_unit > Decimal::ZERO {
                    capital * (*risk_percent / dec!(100)) / risk_per_unit
                } else {
                    Decimal::ZERO
                }
            }
        };

        let mut final_size = base_size;

        if let Some(max) = self.max_quantity {
            final_size = final_size.min(max);
        }

        if let Some(max_value) = self.max_position_value {
            final_size = final_size.min(max_value / price);
        }

        // Never commit more than is left
        let max_affordable = available.max(Decimal::ZERO) / price;
        final_size = final_size.min(max_affordable);

        final_size.floor().max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_quantity() {
        let sizer = PositionSizer::new(PositionSizingMethod::Fixed { quantity: dec!(100) });
        let size = sizer.calculate(dec!(100000), dec!(100000), 50.0, 49.0);
        assert_eq!(size, dec!(100));
    }

    #[test]
    fn test_percent_capital() {
        let sizer = PositionSizer::new(PositionSizingMethod::PercentCapital { percent: dec!(5) });
        // 5% of 100000 = 5000, at 100/unit = 50
        let size = sizer.calculate(dec!(100000), dec!(100000), 100.0, 98.0);
        assert_eq!(size, dec!(50));
    }

    #[test]
    fn test_risk_based() {
        let sizer = PositionSizer::new(PositionSizingMethod::RiskBased {
            risk_percent: dec!(1),
        });
        // Risk 1% = 1000, stop 5 away = 200 units
        let size = sizer.calculate(dec!(100000), dec!(100000), 100.0, 95.0);
        assert_eq!(size, dec!(200));

        // Stop at entry carries no measurable risk
        assert_eq!(sizer.calculate(dec!(100000), dec!(100000), 100.0, 100.0), Decimal::ZERO);
    }

    #[test]
    fn test_limits_and_available_capital() {
        let sizer = PositionSizer::new(PositionSizingMethod::Fixed { quantity: dec!(1000) })
            .with_max_quantity(dec!(100));
        assert_eq!(sizer.calculate(dec!(1000000), dec!(1000000), 50.0, 49.0), dec!(100));

        let sizer = PositionSizer::new(PositionSizingMethod::Fixed { quantity: dec!(1000) });
        // Only 5000 left
        assert_eq!(sizer.calculate(dec!(100000), dec!(5000), 100.0, 99.0), dec!(50));
        assert_eq!(sizer.calculate(dec!(100000), dec!(-10), 100.0, 99.0), Decimal::ZERO);
    }

    #[test]
    fn test_invalid_price() {
        let sizer = PositionSizer::new(PositionSizingMethod::default());
        assert_eq!(sizer.calculate(dec!(100000), dec!(100000), 0.0, 0.0), Decimal::ZERO);
        assert_eq!(sizer.calculate(dec!(100000), dec!(100000), f64::NAN, 1.0), Decimal::ZERO);
    }
}
