//! Unified pre-entry risk validation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use trading_core::error::RiskViolation;
use trading_core::types::{Instrument, OrderPurpose, OrderRequest, Position, Signal};

use crate::{LimitCheck, PortfolioLimits, PositionSizer, PositionSizingMethod, SessionBook, SessionClock};

/// Risk management configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Position sizing method
    pub position_sizing: PositionSizingMethod,
    /// Session limits
    pub limits: PortfolioLimits,
    /// Maximum simultaneously open positions
    pub max_positions: usize,
    /// Maximum quantity per order
    pub max_quantity: Option<Decimal>,
    /// Minimum reward-to-risk ratio for new entries
    pub min_reward_risk: f64,
    /// Signals older than this are refused
    pub max_signal_age_secs: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            position_sizing: PositionSizingMethod::default(),
            limits: PortfolioLimits::default(),
            max_positions: 5,
            max_quantity: Some(dec!(10000)),
            min_reward_risk: 1.5,
            max_signal_age_secs: 120,
        }
    }
}

/// Validates signals against session rules and sizes the entry order.
///
/// A violation rejects only the signal at hand.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    position_sizer: PositionSizer,
    clock: SessionClock,
}

impl RiskManager {
    /// Create a new risk manager.
    pub fn new(config: RiskConfig, clock: SessionClock) -> Self {
        let mut position_sizer = PositionSizer::new(config.position_sizing.clone());
        if let Some(max) = config.max_quantity {
            position_sizer = position_sizer.with_max_quantity(max);
        }

        Self {
            config,
            position_sizer,
            clock,
        }
    }

    /// Validate a signal and produce a sized entry order.
    ///
    /// # Arguments
    /// * `signal` - Candidate from screening
    /// * `instrument` - Resolved instrument of the signal
    /// * `open` - Currently open positions
    /// * `book` - Session capital usage
    /// * `now` - Decision time
    pub fn validate(
        &self,
        signal: &Signal,
        instrument: &Instrument,
        open: &[Position],
        book: &SessionBook,
        now: DateTime<Utc>,
    ) -> Result<OrderRequest, RiskViolation> {
        if !self.clock.entries_open(now) {
            return Err(RiskViolation::EntryWindowClosed);
        }

        let age = signal.age(now).num_seconds();
        if age > self.config.max_signal_age_secs {
            return Err(RiskViolation::StaleSignal {
                symbol: signal.symbol.clone(),
                age_secs: age,
            });
        }

        if !signal.has_valid_levels() {
            return Err(RiskViolation::InvalidLevels(signal.symbol.clone()));
        }

        let reward_risk = signal.reward_risk();
        if reward_risk < self.config.min_reward_risk {
            return Err(RiskViolation::RewardRisk {
                actual: reward_risk,
                minimum: self.config.min_reward_risk,
            });
        }

        if open.iter().any(|p| p.symbol == signal.symbol) {
            return Err(RiskViolation::DuplicateInstrument(signal.symbol.clone()));
        }

        if open.len() >= self.config.max_positions {
            return Err(RiskViolation::MaxPositions(self.config.max_positions));
        }

        let mut quantity = self.position_sizer.calculate(
            book.capital,
            book.available(),
            signal.entry_price,
            signal.stop_loss,
        );
        if quantity <= Decimal::ZERO {
            return Err(RiskViolation::ZeroQuantity(signal.symbol.clone()));
        }

        let price = Decimal::try_from(signal.entry_price).unwrap_or(Decimal::ZERO);
        match self.config.limits.check_new_position(book, quantity * price) {
            LimitCheck::Blocked { reason } => return Err(RiskViolation::Limit(reason)),
            LimitCheck::Reduced { max_value, reason } => {
                quantity = (max_value / price).floor();
                tracing::debug!(symbol = %signal.symbol, %quantity, %reason, "Entry size reduced");
                if quantity <= Decimal::ZERO {
                    return Err(RiskViolation::ZeroQuantity(signal.symbol.clone()));
                }
            }
            LimitCheck::Allowed => {}
        }

        Ok(OrderRequest::market(
            &signal.symbol,
            signal.direction.entry_side(),
            quantity,
            signal.entry_price,
            OrderPurpose::Entry,
        )
        .routed(&instrument.exchange, &instrument.token))
    }

    /// Whether new entries are allowed at all right now.
    pub fn entries_allowed(&self, book: &SessionBook, now: DateTime<Utc>) -> bool {
        self.clock.entries_open(now) && self.config.limits.should_halt_entries(book).is_none()
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Get the current configuration.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}
