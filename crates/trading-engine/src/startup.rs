//! Startup sequence with hard go/no-go gates.
//!
//! ```text
//! Idle -> ResolvingUniverse -> BootstrappingHistory -> Subscribing
//!      -> WarmingUp -> Verifying -> Ready | Failed
//! ```
//!
//! The feed connects on entry to `BootstrappingHistory`, before any history
//! is fetched. `Failed` is terminal: retrying needs a new orchestrator.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use trading_broker::RateLimitedClient;
use trading_core::error::{TradingError, TradingResult};
use trading_core::types::{
    GateStatus, Instrument, StartupState, TradingMode, VerificationReport,
};
use trading_data::{CandleStore, LiveFeedIngestor, PriceTable, UniverseResolver};

use crate::HealthTracker;

/// What the orchestrator needs to know about the session.
#[derive(Debug, Clone)]
pub struct StartupPlan {
    pub mode: TradingMode,
    pub universe: String,
    pub history_days: u32,
    pub min_candle_coverage: f64,
    pub warmup: Duration,
}

/// Result of a successful startup.
#[derive(Debug, Clone)]
pub struct StartupOutcome {
    pub instruments: Vec<Instrument>,
    pub verification: VerificationReport,
    /// False when a paper session runs without a live feed
    pub feed_available: bool,
}

/// Counts the four gates are evaluated on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateInputs {
    /// `None` when the feed gate does not apply (paper mode without a feed)
    pub feed_connected: Option<bool>,
    pub symbols_resolved: usize,
    pub symbols_with_prices: usize,
    /// Instruments seeded with historical candles
    pub symbols_with_candles: usize,
    pub symbols_with_tokens: usize,
}

/// Evaluate the four independent startup gates.
pub fn evaluate_gates(inputs: GateInputs, min_coverage: f64, checked_at: DateTime<Utc>) -> VerificationReport {
    let coverage_ratio = if inputs.symbols_resolved == 0 {
        0.0
    } else {
        inputs.symbols_with_candles as f64 / inputs.symbols_resolved as f64
    };

    VerificationReport {
        feed_connected: match inputs.feed_connected {
            Some(connected) => GateStatus::from_check(connected),
            None => GateStatus::Waived,
        },
        live_price: GateStatus::from_check(inputs.symbols_with_prices >= 1),
        candle_coverage: GateStatus::from_check(inputs.symbols_resolved > 0 && coverage_ratio >= min_coverage),
        tokens_resolved: GateStatus::from_check(inputs.symbols_with_tokens >= 1),
        coverage_ratio,
        min_coverage,
        symbols_with_prices: inputs.symbols_with_prices,
        symbols_with_candles: inputs.symbols_with_candles,
        symbols_with_tokens: inputs.symbols_with_tokens,
        checked_at,
    }
}

/// Drives one-time session setup.
pub struct StartupOrchestrator {
    plan: StartupPlan,
    state: StartupState,
    resolver: UniverseResolver,
    client: RateLimitedClient,
    ingestor: Arc<LiveFeedIngestor>,
    candles: Arc<CandleStore>,
    prices: Arc<PriceTable>,
    health: HealthTracker,
    feed_available: bool,
}

impl StartupOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plan: StartupPlan,
        resolver: UniverseResolver,
        client: RateLimitedClient,
        ingestor: Arc<LiveFeedIngestor>,
        candles: Arc<CandleStore>,
        prices: Arc<PriceTable>,
        health: HealthTracker,
    ) -> Self {
        Self {
            plan,
            state: StartupState::Idle,
            resolver,
            client,
            ingestor,
            candles,
            prices,
            health,
            feed_available: false,
        }
    }

    pub fn state(&self) -> StartupState {
        self.state
    }

    /// Run the whole sequence. Any error, cancellation included, leaves the
    /// orchestrator `Failed`.
    pub async fn run(&mut self) -> TradingResult<StartupOutcome> {
        if self.state != StartupState::Idle {
            return Err(TradingError::Internal(format!(
                "startup already ran (state {}); create a new orchestrator",
                self.state
            )));
        }

        match self.sequence().await {
            Ok(outcome) => Ok(outcome),
            Err(TradingError::Cancelled) => {
                info!(during = %self.state, "Startup cancelled");
                self.state = StartupState::Failed;
                self.health.set_startup_state(StartupState::Failed);
                Err(TradingError::Cancelled)
            }
            Err(e) => {
                let failed_in = self.state;
                self.state = StartupState::Failed;
                self.health.set_startup_state(StartupState::Failed);
                self.health
                    .record_fatal(&format!("startup failed during {}: {}", failed_in, e));
                Err(e)
            }
        }
    }

    async fn sequence(&mut self) -> TradingResult<StartupOutcome> {
        self.advance(StartupState::ResolvingUniverse)?;
        let instruments = self.resolver.resolve(&self.plan.universe).await?;
        self.health.update(|h| h.symbols_total = instruments.len());

        self.advance(StartupState::BootstrappingHistory)?;
        self.connect_feed().await?;
        self.bootstrap_history(&instruments).await?;

        self.advance(StartupState::Subscribing)?;
        if self.feed_available {
            self.ingestor.subscribe(&instruments).await?;
        }

        self.advance(StartupState::WarmingUp)?;
        if self.feed_available {
            let warmup = self.ingestor.wait_for_warmup(self.plan.warmup).await?;
            if !warmup.is_complete() {
                warn!(
                    missing = warmup.missing.len(),
                    waited_ms = warmup.waited.as_millis() as u64,
                    "Warm-up window elapsed before every instrument ticked"
                );
            }
        } else {
            let seeded = self
                .prices
                .seed_from_closes(&self.candles, instruments.iter().map(|i| i.symbol.as_str()));
            warn!(seeded, "No live feed, prices seeded from last historical close");
        }

        self.advance(StartupState::Verifying)?;
        let verification = self.verify(&instruments);
        self.health.record_verification(&verification);
        self.health.update(|h| h.feed_connected = self.ingestor.is_connected());
        if !verification.passed() {
            return Err(TradingError::VerificationFailed(format!(
                "failing gates: {} ({})",
                verification.failing_gates().join(", "),
                verification.summary()
            )));
        }

        self.advance(StartupState::Ready)?;
        info!(summary = %verification.summary(), "Startup verification passed");
        Ok(StartupOutcome {
            instruments,
            verification,
            feed_available: self.feed_available,
        })
    }

    /// Move to `next`, refusing anything but the single successor state.
    fn advance(&mut self, next: StartupState) -> TradingResult<()> {
        if self.state.successor() != Some(next) {
            return Err(TradingError::Internal(format!(
                "illegal startup transition {} -> {}",
                self.state, next
            )));
        }
        info!(from = %self.state, to = %next, "Startup state changed");
        self.state = next;
        self.health.set_startup_state(next);
        Ok(())
    }

    async fn connect_feed(&mut self) -> TradingResult<()> {
        match self.ingestor.connect().await {
            Ok(()) => {
                self.feed_available = true;
                Ok(())
            }
            Err(TradingError::Cancelled) => Err(TradingError::Cancelled),
            Err(e) if self.plan.mode.risks_capital() => Err(e),
            Err(e) => {
                warn!(error = %e, "Feed unavailable, paper session continues degraded");
                self.feed_available = false;
                Ok(())
            }
        }
    }

    async fn bootstrap_history(&self, instruments: &[Instrument]) -> TradingResult<()> {
        let to = Utc::now();
        let from = to - chrono::Duration::days(i64::from(self.plan.history_days));
        let interval = self.candles.interval();

        for instrument in instruments {
            match self.client.fetch_history(instrument, interval, from, to).await {
                Ok(bars) => {
                    let kept = self.candles.bootstrap(&instrument.symbol, bars);
                    info!(symbol = %instrument.symbol, candles = kept, "History bootstrapped");
                }
                Err(TradingError::Cancelled) => return Err(TradingError::Cancelled),
                Err(e) => {
                    warn!(symbol = %instrument.symbol, error = %e, "Skipping history, fetch failed");
                }
            }
        }
        Ok(())
    }

    fn verify(&self, instruments: &[Instrument]) -> VerificationReport {
        let feed_connected = if self.feed_available {
            Some(self.ingestor.is_connected())
        } else if self.plan.mode.risks_capital() {
            Some(false)
        } else {
            None
        };

        let inputs = GateInputs {
            feed_connected,
            symbols_resolved: instruments.len(),
            symbols_with_prices: instruments.iter().filter(|i| self.prices.has_price(&i.symbol)).count(),
            symbols_with_candles: instruments.iter().filter(|i| self.candles.has_history(&i.symbol)).count(),
            symbols_with_tokens: instruments.iter().filter(|i| !i.token.is_empty()).count(),
        };
        evaluate_gates(inputs, self.plan.min_candle_coverage, Utc::now())
    }
}
