//! Trading signals emitted by screening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Side;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Order side that opens a position in this direction.
    pub fn entry_side(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    /// Order side that closes a position in this direction.
    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }

    /// +1 for long, -1 for short. Multiplying a price move by the sign gives
    /// the move in the holder's favour.
    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Direction implied by a signed trend value.
    pub fn from_trend(trend: f64) -> Option<Self> {
        if trend > 0.0 {
            Some(Direction::Long)
        } else if trend < 0.0 {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// A candidate trade. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub sector: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target: f64,
    /// Composite screening score; higher is better
    pub score: f64,
    /// ATR of the signal interval at generation time
    pub atr: f64,
    pub generated_at: DateTime<Utc>,
    /// Pattern / strategy tag
    pub tag: String,
}

impl Signal {
    /// Distance from entry to stop, always positive for well-formed signals.
    pub fn risk_per_unit(&self) -> f64 {
        (self.entry_price - self.stop_loss) * self.direction.sign()
    }

    /// Distance from entry to target, always positive for well-formed signals.
    pub fn reward_per_unit(&self) -> f64 {
        (self.target - self.entry_price) * self.direction.sign()
    }

    /// Reward-to-risk ratio; zero when risk is not positive.
    pub fn reward_risk(&self) -> f64 {
        let risk = self.risk_per_unit();
        if risk <= 0.0 {
            0.0
        } else {
            self.reward_per_unit() / risk
        }
    }

    /// Stop below and target above entry for longs, mirrored for shorts.
    pub fn has_valid_levels(&self) -> bool {
        self.risk_per_unit() > 0.0 && self.reward_per_unit() > 0.0
    }

    /// Age of the signal at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.generated_at
    }
}
