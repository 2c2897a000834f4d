//! Indicator trait definitions.

use crate::error::TradingError;
use crate::types::Candle;

/// Trait for technical indicators over a price series.
///
/// Indicators process price data and produce derived values
/// useful for screening decisions.
pub trait Indicator: Send + Sync {
    /// The output type of the indicator.
    type Output;

    /// Calculate indicator values for the given data.
    ///
    /// # Arguments
    /// * `data` - Input data (typically closes)
    ///
    /// # Returns
    /// A vector of indicator values, one per complete window
    fn calculate(&self, data: &[f64]) -> Vec<Self::Output>;

    /// Get the minimum data points required.
    fn period(&self) -> usize;

    /// Get the name of the indicator.
    fn name(&self) -> &str;

    /// Most recent value, if there is enough data.
    fn last(&self, data: &[f64]) -> Option<Self::Output> {
        self.calculate(data).pop()
    }

    /// Validate that there's enough data.
    fn validate_data(&self, data: &[f64]) -> Result<(), TradingError> {
        if data.len() < self.period() {
            return Err(TradingError::InsufficientData {
                required: self.period(),
                available: data.len(),
            });
        }
        Ok(())
    }
}

/// Indicator that needs full candles rather than a single series (e.g. ATR).
pub trait CandleIndicator: Send + Sync {
    type Output;

    fn calculate(&self, candles: &[Candle]) -> Vec<Self::Output>;

    fn period(&self) -> usize;

    fn name(&self) -> &str;

    fn last(&self, candles: &[Candle]) -> Option<Self::Output> {
        self.calculate(candles).pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestIndicator {
        period: usize,
    }

    impl Indicator for TestIndicator {
        type Output = f64;

        fn calculate(&self, data: &[f64]) -> Vec<f64> {
            if data.len() < self.period {
                return vec![];
            }
            // Simple sum indicator for testing
            data.windows(self.period).map(|w| w.iter().sum()).collect()
        }

        fn period(&self) -> usize {
            self.period
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    #[test]
    fn test_indicator_validation() {
        let indicator = TestIndicator { period: 5 };

        assert!(indicator.validate_data(&[1.0, 2.0, 3.0]).is_err());
        assert!(indicator.validate_data(&[1.0, 2.0, 3.0, 4.0, 5.0]).is_ok());
    }

    #[test]
    fn test_indicator_last() {
        let indicator = TestIndicator { period: 3 };
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];

        assert_eq!(indicator.calculate(&data).len(), 3);
        assert_eq!(indicator.last(&data), Some(12.0)); // 3+4+5
        assert_eq!(indicator.last(&data[..2]), None);
    }
}
