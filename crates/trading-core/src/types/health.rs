//! Session phases, verification gates and the engine health snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TradingMode;

/// States of the startup sequence. Transitions are strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartupState {
    #[default]
    Idle,
    ResolvingUniverse,
    BootstrappingHistory,
    Subscribing,
    WarmingUp,
    Verifying,
    Ready,
    Failed,
}

impl StartupState {
    /// The only state reachable from this one on success.
    pub fn successor(&self) -> Option<StartupState> {
        match self {
            StartupState::Idle => Some(StartupState::ResolvingUniverse),
            StartupState::ResolvingUniverse => Some(StartupState::BootstrappingHistory),
            StartupState::BootstrappingHistory => Some(StartupState::Subscribing),
            StartupState::Subscribing => Some(StartupState::WarmingUp),
            StartupState::WarmingUp => Some(StartupState::Verifying),
            StartupState::Verifying => Some(StartupState::Ready),
            StartupState::Ready | StartupState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StartupState::Ready | StartupState::Failed)
    }
}

impl fmt::Display for StartupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StartupState::Idle => "idle",
            StartupState::ResolvingUniverse => "resolving_universe",
            StartupState::BootstrappingHistory => "bootstrapping_history",
            StartupState::Subscribing => "subscribing",
            StartupState::WarmingUp => "warming_up",
            StartupState::Verifying => "verifying",
            StartupState::Ready => "ready",
            StartupState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Coarse lifecycle of a trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionPhase::Starting | SessionPhase::Running | SessionPhase::Stopping
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Starting => "starting",
            SessionPhase::Running => "running",
            SessionPhase::Stopping => "stopping",
            SessionPhase::Stopped => "stopped",
            SessionPhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single verification gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Passed,
    Failed,
    /// Not applicable in this mode; recorded explicitly instead of passing
    Waived,
}

impl GateStatus {
    pub fn from_check(ok: bool) -> Self {
        if ok {
            GateStatus::Passed
        } else {
            GateStatus::Failed
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, GateStatus::Failed)
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateStatus::Passed => write!(f, "passed"),
            GateStatus::Failed => write!(f, "FAILED"),
            GateStatus::Waived => write!(f, "waived"),
        }
    }
}

/// Result of the pre-trade verification step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub feed_connected: GateStatus,
    pub live_price: GateStatus,
    pub candle_coverage: GateStatus,
    pub tokens_resolved: GateStatus,
    /// symbols_with_candles / symbols_resolved
    pub coverage_ratio: f64,
    pub min_coverage: f64,
    pub symbols_with_prices: usize,
    pub symbols_with_candles: usize,
    pub symbols_with_tokens: usize,
    pub checked_at: DateTime<Utc>,
}

impl VerificationReport {
    /// All four gates passed or were waived.
    pub fn passed(&self) -> bool {
        self.gates().iter().all(|(_, status)| !status.is_blocking())
    }

    pub fn gates(&self) -> [(&'static str, GateStatus); 4] {
        [
            ("feed_connected", self.feed_connected),
            ("live_price", self.live_price),
            ("candle_coverage", self.candle_coverage),
            ("tokens_resolved", self.tokens_resolved),
        ]
    }

    /// Names of the gates that blocked startup.
    pub fn failing_gates(&self) -> Vec<&'static str> {
        self.gates()
            .iter()
            .filter(|(_, status)| status.is_blocking())
            .map(|(name, _)| *name)
            .collect()
    }

    /// One-line description suitable for logs and error messages.
    pub fn summary(&self) -> String {
        format!(
            "feed={} live_price={} ({} symbols) candles={} ({:.0}% >= {:.0}%) tokens={} ({} symbols)",
            self.feed_connected,
            self.live_price,
            self.symbols_with_prices,
            self.candle_coverage,
            self.coverage_ratio * 100.0,
            self.min_coverage * 100.0,
            self.tokens_resolved,
            self.symbols_with_tokens,
        )
    }
}

/// Process-wide health snapshot, safe to hand to status readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineHealth {
    pub phase: SessionPhase,
    pub startup: StartupState,
    pub mode: TradingMode,
    pub universe: String,
    pub feed_connected: bool,
    pub symbols_total: usize,
    pub symbols_with_prices: usize,
    pub symbols_with_candles: usize,
    pub symbols_with_tokens: usize,
    pub last_verification: Option<VerificationReport>,
    pub consecutive_errors: u32,
    /// Why the last session stopped, when it did not stop cleanly
    pub stop_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for EngineHealth {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            startup: StartupState::Idle,
            mode: TradingMode::Paper,
            universe: String::new(),
            feed_connected: false,
            symbols_total: 0,
            symbols_with_prices: 0,
            symbols_with_candles: 0,
            symbols_with_tokens: 0,
            last_verification: None,
            consecutive_errors: 0,
            stop_reason: None,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(feed: GateStatus) -> VerificationReport {
        VerificationReport {
            feed_connected: feed,
            live_price: GateStatus::Passed,
            candle_coverage: GateStatus::Passed,
            tokens_resolved: GateStatus::Passed,
            coverage_ratio: 1.0,
            min_coverage: 0.8,
            symbols_with_prices: 2,
            symbols_with_candles: 2,
            symbols_with_tokens: 2,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_startup_sequence() {
        let mut state = StartupState::Idle;
        let mut visited = vec![state];
        while let Some(next) = state.successor() {
            state = next;
            visited.push(state);
        }
        assert_eq!(visited.len(), 7);
        assert_eq!(state, StartupState::Ready);
        assert!(StartupState::Failed.successor().is_none());
    }

    #[test]
    fn test_waived_gate_does_not_block() {
        assert!(report(GateStatus::Passed).passed());
        assert!(report(GateStatus::Waived).passed());

        let failed = report(GateStatus::Failed);
        assert!(!failed.passed());
        assert_eq!(failed.failing_gates(), vec!["feed_connected"]);
        assert!(failed.summary().contains("feed=FAILED"));
    }
}
