//! Open and closed position types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Direction, Fill, Instrument, Signal};

/// Lifecycle status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Price reached the target
    Target,
    /// Price breached the current stop
    StopLoss,
    /// End-of-day square-off time reached
    SquareOff,
    /// External emergency stop
    EmergencyStop,
    /// Session stopped by the operator or a fatal error
    SessionStop,
    /// Operator force-close request
    ForceClose,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::Target => "target",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::SquareOff => "square_off",
            ExitReason::EmergencyStop => "emergency_stop",
            ExitReason::SessionStop => "session_stop",
            ExitReason::ForceClose => "force_close",
        };
        write!(f, "{}", s)
    }
}

/// An open position in a single instrument.
///
/// The stop-loss is private: it can only be moved through [`Position::ratchet_stop`],
/// which refuses any move against the holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub exchange: String,
    pub token: String,
    pub sector: String,
    pub direction: Direction,
    pub quantity: Decimal,
    pub entry_price: f64,
    /// Stop at entry time
    pub initial_stop: f64,
    stop_loss: f64,
    pub target: f64,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    /// Most favourable price seen since entry
    pub best_price: f64,
    /// Number of times the stop has been advanced
    pub ratchet_count: u32,
    pub tag: String,
    /// ATR carried over from the signal, used by ATR trailing
    pub atr: f64,
}

impl Position {
    /// Build an open position from the signal that produced it and its entry fill.
    ///
    /// Stop and target keep their distance from the signal's entry, re-anchored
    /// at the actual fill price.
    pub fn from_fill(signal: &Signal, instrument: &Instrument, fill: &Fill) -> Self {
        let slippage = fill.price - signal.entry_price;
        Self {
            id: Uuid::new_v4(),
            symbol: signal.symbol.clone(),
            exchange: instrument.exchange.clone(),
            token: instrument.token.clone(),
            sector: signal.sector.clone(),
            direction: signal.direction,
            quantity: fill.quantity,
            entry_price: fill.price,
            initial_stop: signal.stop_loss + slippage,
            stop_loss: signal.stop_loss + slippage,
            target: signal.target + slippage,
            opened_at: fill.timestamp,
            status: PositionStatus::Open,
            best_price: fill.price,
            ratchet_count: 0,
            tag: signal.tag.clone(),
            atr: signal.atr,
        }
    }

    /// Create an open position directly from its levels.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        quantity: Decimal,
        entry_price: f64,
        stop_loss: f64,
        target: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            exchange: String::new(),
            token: String::new(),
            sector: String::new(),
            direction,
            quantity,
            entry_price,
            initial_stop: stop_loss,
            stop_loss,
            target,
            opened_at,
            status: PositionStatus::Open,
            best_price: entry_price,
            ratchet_count: 0,
            tag: String::new(),
            atr: 0.0,
        }
    }

    /// Current stop-loss level.
    #[inline]
    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Record a new observed price, tracking the best price seen.
    pub fn observe(&mut self, price: f64) {
        if (price - self.best_price) * self.direction.sign() > 0.0 {
            self.best_price = price;
        }
    }

    /// Advance the stop towards `candidate` if that is favourable to the holder.
    ///
    /// Returns the previous stop when it moved.
    pub fn ratchet_stop(&mut self, candidate: f64) -> Option<f64> {
        if !candidate.is_finite() {
            return None;
        }
        if (candidate - self.stop_loss) * self.direction.sign() > 0.0 {
            let previous = self.stop_loss;
            self.stop_loss = candidate;
            self.ratchet_count += 1;
            Some(previous)
        } else {
            None
        }
    }

    pub fn target_reached(&self, price: f64) -> bool {
        (price - self.target) * self.direction.sign() >= 0.0
    }

    pub fn stop_breached(&self, price: f64) -> bool {
        (price - self.stop_loss) * self.direction.sign() <= 0.0
    }

    /// Unrealized gain at `price` as a percentage of entry.
    pub fn gain_pct(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) * self.direction.sign() / self.entry_price * 100.0
    }

    /// Profit or loss if closed at `price`.
    pub fn pnl_at(&self, price: f64) -> Decimal {
        let per_unit = (price - self.entry_price) * self.direction.sign();
        Decimal::try_from(per_unit)
            .map(|d| (d * self.quantity).round_dp(2))
            .unwrap_or(Decimal::ZERO)
    }

    /// Notional value at entry.
    pub fn notional(&self) -> Decimal {
        Decimal::try_from(self.entry_price)
            .map(|p| p * self.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Consume the position into its closed record.
    pub fn close(mut self, exit_price: f64, reason: ExitReason, at: DateTime<Utc>) -> ClosedPosition {
        self.status = PositionStatus::Closed;
        let realized_pnl = self.pnl_at(exit_price);
        ClosedPosition {
            position: self,
            exit_price,
            exit_reason: reason,
            closed_at: at,
            realized_pnl,
        }
    }
}

/// A position after exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub closed_at: DateTime<Utc>,
    pub realized_pnl: Decimal,
}
