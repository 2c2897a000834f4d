//! Trailing stop ratchet.
//!
//! Computes where a position's stop *could* move to. The position itself
//! refuses any candidate that is not an improvement for the holder.

use serde::{Deserialize, Serialize};
use trading_core::types::Position;

/// How the trailing stop follows price once activated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TrailingMethod {
    /// Trail the best price by a fixed percentage
    Percent { trail_pct: f64 },
    /// Trail the best price by a multiple of the entry ATR
    Atr { multiplier: f64 },
    /// Move to break-even after one step of gain, then lock one more step
    /// for every further step
    BreakevenStep { step_pct: f64 },
}

impl Default for TrailingMethod {
    fn default() -> Self {
        TrailingMethod::Percent { trail_pct: 1.5 }
    }
}

/// Trailing stop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    /// Unrealized gain (percent of entry) required before the stop trails
    pub activation_gain_pct: f64,
    #[serde(flatten)]
    pub method: TrailingMethod,
}

impl Default for TrailingStop {
    fn default() -> Self {
        Self {
            activation_gain_pct: 1.0,
            method: TrailingMethod::default(),
        }
    }
}

impl TrailingStop {
    pub fn new(activation_gain_pct: f64, method: TrailingMethod) -> Self {
        Self {
            activation_gain_pct,
            method,
        }
    }

    /// Candidate stop for `position` at `price`, or `None` while the trail is
    /// not active.
    ///
    /// Uses the position's best observed price, so the caller should record
    /// `price` on the position first.
    pub fn candidate(&self, position: &Position, price: f64) -> Option<f64> {
        if position.gain_pct(price) < self.activation_gain_pct {
            return None;
        }

        let sign = position.direction.sign();
        let best = position.best_price;
        let candidate = match &self.method {
            TrailingMethod::Percent { trail_pct } => best * (1.0 - sign * trail_pct / 100.0),

            TrailingMethod::Atr { multiplier } => {
                if position.atr <= 0.0 {
                    return None;
                }
                best - sign * position.atr * multiplier
            }

            TrailingMethod::BreakevenStep { step_pct } => {
                if *step_pct <= 0.0 {
                    return None;
                }
                let steps = (position.gain_pct(best) / step_pct).floor();
                if steps < 1.0 {
                    return None;
                }
                position.entry_price * (1.0 + sign * (steps - 1.0) * step_pct / 100.0)
            }
        };

        candidate.is_finite().then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use trading_core::types::Direction;

    fn long() -> Position {
        Position::new("INFY", Direction::Long, dec!(10), 100.0, 98.0, 106.0, Utc::now())
    }

    fn step(trail: &TrailingStop, pos: &mut Position, price: f64) {
        pos.observe(price);
        if let Some(candidate) = trail.candidate(pos, price) {
            pos.ratchet_stop(candidate);
        }
    }

    #[test]
    fn test_percent_trail_sequence() {
        let trail = TrailingStop::new(1.0, TrailingMethod::Percent { trail_pct: 1.5 });
        let mut pos = long();

        step(&trail, &mut pos, 100.0);
        assert_eq!(pos.stop_loss(), 98.0);

        step(&trail, &mut pos, 102.0);
        assert!((pos.stop_loss() - 100.47).abs() < 1e-9);

        step(&trail, &mut pos, 104.0);
        assert!((pos.stop_loss() - 102.44).abs() < 1e-9);

        // Pullback keeps the stop where it is
        step(&trail, &mut pos, 103.0);
        assert!((pos.stop_loss() - 102.44).abs() < 1e-9);
        assert_eq!(pos.ratchet_count, 2);
    }

    #[test]
    fn test_not_active_below_threshold() {
        let trail = TrailingStop::new(2.0, TrailingMethod::Percent { trail_pct: 0.5 });
        let mut pos = long();
        pos.observe(101.5);
        assert_eq!(trail.candidate(&pos, 101.5), None);
    }

    #[test]
    fn test_atr_trail_short() {
        let trail = TrailingStop::new(0.5, TrailingMethod::Atr { multiplier: 1.0 });
        let mut pos = Position::new("TCS", Direction::Short, dec!(1), 100.0, 102.0, 95.0, Utc::now());
        pos.atr = 1.5;
        step(&trail, &mut pos, 98.0);
        assert!((pos.stop_loss() - 99.5).abs() < 1e-9);
    }

    #[test]
    fn test_breakeven_steps() {
        let trail = TrailingStop::new(0.0, TrailingMethod::BreakevenStep { step_pct: 1.0 });
        let mut pos = long();

        step(&trail, &mut pos, 100.5);
        assert_eq!(pos.stop_loss(), 98.0);

        step(&trail, &mut pos, 101.2);
        assert!((pos.stop_loss() - 100.0).abs() < 1e-9);

        step(&trail, &mut pos, 103.1);
        assert!((pos.stop_loss() - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_never_adverse_over_random_walk() {
        let trail = TrailingStop::default();
        let mut pos = long();
        let mut last_stop = pos.stop_loss();
        let mut price = 100.0;

        for i in 0..500 {
            price += ((i * 7919) % 13) as f64 / 10.0 - 0.6;
            step(&trail, &mut pos, price);
            assert!(pos.stop_loss() >= last_stop);
            last_stop = pos.stop_loss();
        }
    }
}
