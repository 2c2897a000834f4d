//! Process-wide engine health, read through snapshots.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::error;
use trading_core::types::{EngineHealth, SessionPhase, StartupState, TradingMode, VerificationReport};

/// Shared, lock-protected [`EngineHealth`]. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct HealthTracker {
    inner: Arc<RwLock<EngineHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current health.
    pub fn snapshot(&self) -> EngineHealth {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` and stamp the update time.
    pub fn update(&self, f: impl FnOnce(&mut EngineHealth)) {
        let mut health = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut health);
        health.updated_at = Utc::now();
    }

    /// Reset for a new session.
    pub fn begin_session(&self, mode: TradingMode, universe: &str) {
        self.update(|h| {
            *h = EngineHealth {
                phase: SessionPhase::Starting,
                mode,
                universe: universe.to_string(),
                ..EngineHealth::default()
            };
        });
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        self.update(|h| h.phase = phase);
    }

    pub fn set_startup_state(&self, state: StartupState) {
        self.update(|h| h.startup = state);
    }

    pub fn record_verification(&self, report: &VerificationReport) {
        self.update(|h| {
            h.symbols_with_prices = report.symbols_with_prices;
            h.symbols_with_candles = report.symbols_with_candles;
            h.symbols_with_tokens = report.symbols_with_tokens;
            h.last_verification = Some(report.clone());
        });
    }

    /// Refresh the live market counters.
    pub fn record_market(&self, feed_connected: bool, with_prices: usize, with_candles: usize) {
        self.update(|h| {
            h.feed_connected = feed_connected;
            h.symbols_with_prices = with_prices;
            h.symbols_with_candles = with_candles;
        });
    }

    pub fn set_consecutive_errors(&self, count: u32) {
        self.update(|h| h.consecutive_errors = count);
    }

    /// Record a fatal stop. Logged at error level.
    pub fn record_fatal(&self, reason: &str) {
        error!(%reason, "Session stopped on a fatal error");
        self.update(|h| {
            h.phase = SessionPhase::Failed;
            h.stop_reason = Some(reason.to_string());
        });
    }

    /// Record a stop that was not requested by the operator.
    pub fn record_stop(&self, reason: Option<&str>) {
        self.update(|h| {
            h.phase = SessionPhase::Stopped;
            if let Some(reason) = reason {
                h.stop_reason = Some(reason.to_string());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let health = HealthTracker::new();
        health.record_fatal("previous failure");

        health.begin_session(TradingMode::Live, "NIFTY_IT");
        let snap = health.snapshot();
        assert_eq!(snap.phase, SessionPhase::Starting);
        assert_eq!(snap.universe, "NIFTY_IT");
        assert!(snap.stop_reason.is_none());

        health.record_market(true, 8, 10);
        health.set_consecutive_errors(2);
        let clone = health.clone();
        clone.record_stop(Some("emergency stop"));

        let snap = health.snapshot();
        assert_eq!(snap.phase, SessionPhase::Stopped);
        assert_eq!(snap.symbols_with_prices, 8);
        assert_eq!(snap.consecutive_errors, 2);
        assert_eq!(snap.stop_reason.as_deref(), Some("emergency stop"));
    }

    #[test]
    fn test_fatal_keeps_reason() {
        let health = HealthTracker::new();
        health.record_fatal("gates failed");
        let snap = health.snapshot();
        assert_eq!(snap.phase, SessionPhase::Failed);
        assert_eq!(snap.stop_reason.as_deref(), Some("gates failed"));
    }
}
