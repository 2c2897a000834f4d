//! Session-level exposure and loss limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Result of a limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitCheck {
    /// Trade allowed
    Allowed,
    /// Trade blocked with reason
    Blocked { reason: String },
    /// Trade allowed but with reduced notional
    Reduced { max_value: Decimal, reason: String },
}

impl LimitCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitCheck::Allowed | LimitCheck::Reduced { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, LimitCheck::Blocked { .. })
    }
}

/// Capital usage of the running session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionBook {
    /// Capital allocated to the session
    pub capital: Decimal,
    /// Entry notional of all open positions
    pub open_exposure: Decimal,
    /// Realized P&L of closed positions
    pub realized_pnl: Decimal,
}

impl SessionBook {
    pub fn available(&self) -> Decimal {
        self.capital + self.realized_pnl.min(Decimal::ZERO) - self.open_exposure
    }
}

/// Session limits configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioLimits {
    /// Maximum position notional as percentage of capital
    pub max_position_pct: Decimal,
    /// Maximum total exposure as percentage of capital
    pub max_exposure_pct: Decimal,
    /// Stop opening positions once the session is down this much
    pub daily_loss_limit_pct: Decimal,
}

impl Default for PortfolioLimits {
    fn default() -> Self {
        Self {
            max_position_pct: dec!(20),
            max_exposure_pct: dec!(100),
            daily_loss_limit_pct: dec!(3),
        }
    }
}

impl PortfolioLimits {
    /// Check if a new position of `position_value` notional is allowed.
    pub fn check_new_position(&self, book: &SessionBook, position_value: Decimal) -> LimitCheck {
        if book.capital <= Decimal::ZERO {
            return LimitCheck::Blocked {
                reason: "No capital allocated".to_string(),
            };
        }

        if let Some(reason) = self.should_halt_entries(book) {
            return LimitCheck::Blocked { reason };
        }

        let max_exposure = book.capital * self.max_exposure_pct / dec!(100);
        let new_exposure = book.open_exposure + position_value;
        if new_exposure > max_exposure {
            let max_additional = max_exposure - book.open_exposure;
            if max_additional <= Decimal::ZERO {
                return LimitCheck::Blocked {
                    reason: format!(
                        "Max exposure reached: {:.2}% (limit: {:.2}%)",
                        book.open_exposure / book.capital * dec!(100),
                        self.max_exposure_pct
                    ),
                };
            }
            return LimitCheck::Reduced {
                max_value: max_additional,
                reason: format!("Limited by max exposure ({:.2}%)", self.max_exposure_pct),
            };
        }

        let max_position = book.capital * self.max_position_pct / dec!(100);
        if position_value > max_position {
            return LimitCheck::Reduced {
                max_value: max_position,
                reason: format!(
                    "Limited by max position size ({:.2}%)",
                    self.max_position_pct
                ),
            };
        }

        LimitCheck::Allowed
    }

    /// Reason to refuse all new entries, if any.
    pub fn should_halt_entries(&self, book: &SessionBook) -> Option<String> {
        if book.capital <= Decimal::ZERO {
            return None;
        }
        let pnl_pct = book.realized_pnl / book.capital * dec!(100);
        if pnl_pct <= -self.daily_loss_limit_pct {
            return Some(format!(
                "Daily loss limit reached: {:.2}% (limit: {:.2}%)",
                pnl_pct.abs(),
                self.daily_loss_limit_pct
            ));
        }
        None
    }
}
