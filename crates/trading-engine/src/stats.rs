//! Running session statistics.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trading_core::types::ClosedPosition;

/// Counters and trade outcomes of the current session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Completed screening passes
    pub screening_passes: u64,
    /// Signals accepted by screening
    pub signals_emitted: u64,
    /// Signals refused by the execution re-check at entry
    pub entry_rejections: u64,
    /// Signals refused by risk validation
    pub risk_rejections: u64,
    pub positions_opened: u64,
    pub positions_closed: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// Win rate percentage
    pub win_rate_pct: Decimal,
    pub realized_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    /// Gross profit / gross loss
    pub profit_factor: Decimal,
    pub stop_ratchets: u64,
    pub supervision_ticks: u64,
    /// Ticks that recorded at least one error
    pub error_ticks: u64,
    /// Times every position was closed at once
    pub close_all_runs: u32,
    /// Closed positions per exit reason
    pub exits: BTreeMap<String, u64>,
}

impl SessionStats {
    /// Fold a closed position into the outcome figures.
    pub fn record_close(&mut self, closed: &ClosedPosition) {
        self.positions_closed += 1;
        *self.exits.entry(closed.exit_reason.to_string()).or_insert(0) += 1;

        let pnl = closed.realized_pnl;
        self.realized_pnl += pnl;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
            self.gross_profit += pnl;
        } else if pnl < Decimal::ZERO {
            self.losing_trades += 1;
            self.gross_loss += pnl.abs();
        }

        self.win_rate_pct = Decimal::from(self.winning_trades * 100) / Decimal::from(self.positions_closed);
        if self.gross_loss > Decimal::ZERO {
            self.profit_factor = (self.gross_profit / self.gross_loss).round_dp(2);
        }
    }
}

/// Shared handle to the session statistics.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<Mutex<SessionStats>>,
}

impl StatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, f: impl FnOnce(&mut SessionStats)) {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn snapshot(&self) -> SessionStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        self.update(|s| *s = SessionStats::default());
    }
}
