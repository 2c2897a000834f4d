//! The running session: screening on the slow cadence, supervision on the
//! fast one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trading_core::error::{TradingError, TradingResult};
use trading_core::traits::StateStore;
use trading_core::types::{ExitReason, Instrument, JournalEvent, JournalRecord, TradingMode};
use trading_data::{CandleStore, LiveFeedIngestor, PriceTable};
use trading_risk::RiskManager;
use trading_screening::{MarketContext, ScreeningPipeline, ScreeningReport};

use crate::{HealthTracker, PositionSupervisor, StatsHandle, SupervisionReport};

/// Cadence and error budget of the loop.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub mode: TradingMode,
    pub fast_tick: Duration,
    /// Screening runs every `slow_tick_multiple` fast ticks
    pub slow_tick_multiple: u32,
    pub max_consecutive_errors: u32,
    pub capital: Decimal,
}

impl ControlConfig {
    fn slow_tick(&self) -> Duration {
        self.fast_tick.saturating_mul(self.slow_tick_multiple.max(1))
    }
}

/// Operator requests delivered to the running loop.
#[derive(Debug)]
pub enum ControlCommand {
    ForceCloseAll {
        reply: oneshot::Sender<SupervisionReport>,
    },
}

/// Why the loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The session token was cancelled
    Cancelled,
    /// The state store raised the emergency stop
    EmergencyStop,
}

/// Live market state the loop reads.
#[derive(Clone)]
pub struct MarketState {
    pub instruments: Arc<Vec<Instrument>>,
    pub candles: Arc<CandleStore>,
    pub prices: Arc<PriceTable>,
    pub ingestor: Arc<LiveFeedIngestor>,
}

pub struct ControlLoop {
    config: ControlConfig,
    market: MarketState,
    pipeline: Arc<ScreeningPipeline>,
    risk: RiskManager,
    supervisor: Arc<PositionSupervisor>,
    store: Arc<dyn StateStore>,
    health: HealthTracker,
    stats: StatsHandle,
    cancel: CancellationToken,
}

impl ControlLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ControlConfig,
        market: MarketState,
        pipeline: Arc<ScreeningPipeline>,
        risk: RiskManager,
        supervisor: Arc<PositionSupervisor>,
        store: Arc<dyn StateStore>,
        health: HealthTracker,
        stats: StatsHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            market,
            pipeline,
            risk,
            supervisor,
            store,
            health,
            stats,
            cancel,
        }
    }

    /// Run until cancelled, emergency-stopped or out of error budget.
    /// Every open position is closed exactly once on the way out.
    pub async fn run(self, mut commands: mpsc::Receiver<ControlCommand>) -> TradingResult<LoopExit> {
        let screening_cancel = self.cancel.child_token();
        let (results_tx, mut results) = mpsc::channel(4);
        let screener = self.spawn_screening(results_tx, screening_cancel.clone());

        let by_symbol: HashMap<String, Instrument> = self
            .market
            .instruments
            .iter()
            .map(|i| (i.symbol.clone(), i.clone()))
            .collect();

        let mut ticker = tokio::time::interval(self.config.fast_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive: u32 = 0;
        let mut commands_open = true;

        info!(
            instruments = by_symbol.len(),
            fast_tick_ms = self.config.fast_tick.as_millis() as u64,
            slow_tick_ms = self.config.slow_tick().as_millis() as u64,
            "Control loop started"
        );

        let outcome: TradingResult<LoopExit> = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(LoopExit::Cancelled),
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => commands_open = false,
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if self.cancel.is_cancelled() {
                break Ok(LoopExit::Cancelled);
            }

            let mut errors: Vec<String> = Vec::new();
            match self.store.emergency_stop().await {
                Ok(true) => {
                    warn!("Emergency stop raised");
                    break Ok(LoopExit::EmergencyStop);
                }
                Ok(false) => {}
                Err(e) => errors.push(format!("state store: {}", e)),
            }

            let feed_connected = self.market.ingestor.is_connected();
            if self.config.mode == TradingMode::Live && !feed_connected {
                errors.push("feed disconnected".to_string());
            }

            while let Ok(result) = results.try_recv() {
                match result {
                    Ok(report) => self.handle_screening(report, &by_symbol, &mut errors).await,
                    Err(e) => errors.push(format!("screening: {}", e)),
                }
            }

            let report = self.supervisor.tick(&self.market.prices.snapshot(), Utc::now()).await;
            for (symbol, e) in &report.failed_exits {
                errors.push(format!("exit {}: {}", symbol, e));
            }

            self.health.record_market(
                feed_connected,
                self.market.prices.symbols_with_prices(),
                self.market.candles.symbols_with_candles(),
            );

            if errors.is_empty() {
                consecutive = 0;
            } else {
                consecutive += 1;
                self.stats.update(|s| s.error_ticks += 1);
                warn!(consecutive, errors = %errors.join("; "), "Control tick had errors");
            }
            self.health.set_consecutive_errors(consecutive);

            if consecutive > self.config.max_consecutive_errors {
                break Err(TradingError::ErrorBudgetExhausted {
                    consecutive,
                    last: errors.join("; "),
                });
            }
        };

        screening_cancel.cancel();
        if let Err(e) = screener.await {
            warn!(error = %e, "Screening task ended abnormally");
        }

        let reason = match &outcome {
            Ok(LoopExit::EmergencyStop) => ExitReason::EmergencyStop,
            _ => ExitReason::SessionStop,
        };
        let closing = self
            .supervisor
            .close_all(reason, &self.market.prices.snapshot(), Utc::now())
            .await;
        for (symbol, e) in &closing.failed_exits {
            warn!(%symbol, error = %e, "Position left open after shutdown");
        }

        info!(closed = closing.closed.len(), ?outcome, "Control loop stopped");
        outcome
    }

    fn spawn_screening(
        &self,
        results: mpsc::Sender<Result<ScreeningReport, String>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let market = self.market.clone();
        let supervisor = self.supervisor.clone();
        let stats = self.stats.clone();
        let period = self.config.slow_tick();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let pipeline = pipeline.clone();
                let market = market.clone();
                let held = supervisor.held_symbols();
                let pass = tokio::task::spawn_blocking(move || screen_once(&pipeline, &market, held)).await;
                let result = pass.map_err(|e| format!("screening pass panicked: {}", e));
                if result.is_ok() {
                    stats.update(|s| s.screening_passes += 1);
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = results.send(result) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Screening task stopped");
        })
    }

    async fn handle_screening(
        &self,
        report: ScreeningReport,
        by_symbol: &HashMap<String, Instrument>,
        errors: &mut Vec<String>,
    ) {
        debug!(
            evaluated = report.evaluated,
            accepted = report.signals.len(),
            rejected = report.rejections.len(),
            "Screening results received"
        );

        for signal in report.signals {
            let Some(instrument) = by_symbol.get(&signal.symbol) else {
                continue;
            };
            self.stats.update(|s| s.signals_emitted += 1);
            self.journal(JournalEvent::SignalEmitted {
                signal: signal.clone(),
            })
            .await;

            let now = Utc::now();
            let ctx = MarketContext::for_entry(
                instrument,
                &self.market.candles,
                &self.market.prices,
                self.pipeline.config(),
                now,
            );
            let signal = match self.pipeline.revalidate(&signal, instrument, &ctx) {
                Ok(repriced) => repriced,
                Err(reason) => {
                    info!(symbol = %signal.symbol, %reason, "Signal failed the entry re-check");
                    self.stats.update(|s| s.entry_rejections += 1);
                    self.journal(JournalEvent::SignalRejected {
                        symbol: signal.symbol.clone(),
                        reason: format!("execution: {}", reason),
                    })
                    .await;
                    continue;
                }
            };

            let open = self.supervisor.open_positions();
            let book = self.supervisor.book(self.config.capital);
            match self.risk.validate(&signal, instrument, &open, &book, now) {
                Ok(order) => {
                    if let Err(e) = self.supervisor.open(&signal, instrument, order.quantity).await {
                        errors.push(format!("entry {}: {}", signal.symbol, e));
                    }
                }
                Err(violation) => {
                    info!(symbol = %signal.symbol, reason = %violation, "Signal rejected by risk");
                    self.stats.update(|s| s.risk_rejections += 1);
                    self.journal(JournalEvent::SignalRejected {
                        symbol: signal.symbol.clone(),
                        reason: violation.to_string(),
                    })
                    .await;
                }
            }
        }
    }

    async fn handle_command(&self, command: ControlCommand) {
        match command {
            ControlCommand::ForceCloseAll { reply } => {
                let report = self
                    .supervisor
                    .close_all(ExitReason::ForceClose, &self.market.prices.snapshot(), Utc::now())
                    .await;
                let _ = reply.send(report);
            }
        }
    }

    async fn journal(&self, event: JournalEvent) {
        if let Err(e) = self.store.append(JournalRecord::now(event)).await {
            warn!(error = %e, "Failed to journal");
        }
    }
}

fn screen_once(pipeline: &ScreeningPipeline, market: &MarketState, held: HashSet<String>) -> ScreeningReport {
    let ctx = MarketContext::build(
        &market.instruments,
        &market.candles,
        &market.prices,
        pipeline.config(),
        held,
        Utc::now(),
    );
    pipeline.screen_detailed(&market.instruments, &ctx)
}
