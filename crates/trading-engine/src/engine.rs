//! The engine object: builds a session from configuration and exposes the
//! operational controls.

use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use trading_broker::RateLimitedClient;
use trading_config::AppConfig;
use trading_core::error::{TradingError, TradingResult};
use trading_core::traits::{MarketFeed, OrderGateway, StateStore, TickSubscriber};
use trading_core::types::{
    ClosedPosition, EngineHealth, JournalEvent, JournalRecord, Position, SessionPhase,
    VerificationReport,
};
use trading_data::{CandleStore, FeedHealth, LiveFeedIngestor, PriceTable, UniverseResolver};
use trading_risk::{RiskManager, SessionClock};
use trading_screening::ScreeningPipeline;

use crate::{
    ControlCommand, ControlConfig, ControlLoop, HealthTracker, LoopExit, MarketState,
    PositionSupervisor, SessionStats, StartupOrchestrator, StartupPlan, StatsHandle,
    SupervisionReport,
};

/// Copied snapshot for status readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub health: EngineHealth,
    pub feed: Option<FeedHealth>,
    pub open_positions: Vec<Position>,
    pub closed_positions: Vec<ClosedPosition>,
    pub stats: SessionStats,
}

struct Session {
    cancel: CancellationToken,
    commands: mpsc::Sender<ControlCommand>,
    handle: JoinHandle<TradingResult<LoopExit>>,
}

/// Owns the collaborators and at most one running session.
pub struct Engine {
    config: AppConfig,
    clock: SessionClock,
    client: RateLimitedClient,
    feed: Arc<dyn MarketFeed>,
    gateway: Arc<dyn OrderGateway>,
    store: Arc<dyn StateStore>,
    health: HealthTracker,
    stats: StatsHandle,
    /// Held for the whole of `start_session`
    startup: Mutex<()>,
    /// Token of a startup in progress, published before it can block
    starting: StdMutex<Option<CancellationToken>>,
    session: Mutex<Option<Session>>,
    supervisor: RwLock<Option<Arc<PositionSupervisor>>>,
    ingestor: RwLock<Option<Arc<LiveFeedIngestor>>>,
}

impl Engine {
    /// Build an engine. The configuration is validated here.
    pub fn new(
        config: AppConfig,
        client: RateLimitedClient,
        feed: Arc<dyn MarketFeed>,
        gateway: Arc<dyn OrderGateway>,
        store: Arc<dyn StateStore>,
    ) -> TradingResult<Self> {
        config.validate()?;
        let clock = config.session.clock()?;
        Ok(Self {
            config,
            clock,
            client,
            feed,
            gateway,
            store,
            health: HealthTracker::new(),
            stats: StatsHandle::new(),
            startup: Mutex::new(()),
            starting: StdMutex::new(None),
            session: Mutex::new(None),
            supervisor: RwLock::new(None),
            ingestor: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn health(&self) -> HealthTracker {
        self.health.clone()
    }

    /// Run startup and, once every gate passes, spawn the control loop.
    ///
    /// A concurrent `stop_session` cancels a startup in progress, which then
    /// returns [`TradingError::Cancelled`].
    pub async fn start_session(&self) -> TradingResult<VerificationReport> {
        let Ok(_startup) = self.startup.try_lock() else {
            return Err(TradingError::SessionAlreadyRunning);
        };
        {
            let mut slot = self.session.lock().await;
            if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
                return Err(TradingError::SessionAlreadyRunning);
            }
            if let Some(previous) = slot.take() {
                // A session that ended on its own; collect its result
                let _ = previous.handle.await;
            }
        }

        let cancel = CancellationToken::new();
        *self.starting.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());
        let result = self.run_startup(cancel).await;
        self.starting.lock().unwrap_or_else(PoisonError::into_inner).take();
        result
    }

    async fn run_startup(&self, cancel: CancellationToken) -> TradingResult<VerificationReport> {
        let session = &self.config.session;
        info!(mode = %session.mode, universe = %session.universe, "Starting session");
        self.health.begin_session(session.mode, &session.universe);
        self.stats.reset();
        self.journal_phase(SessionPhase::Starting, "session starting").await;

        let candles = Arc::new(CandleStore::new(self.config.candles.interval, self.config.candles.capacity));
        let prices = Arc::new(PriceTable::new());
        let ingestor = Arc::new(LiveFeedIngestor::new(
            self.feed.clone(),
            self.config.feed.connection.clone(),
            cancel.clone(),
        ));
        ingestor.add_subscriber(candles.clone() as Arc<dyn TickSubscriber>);
        ingestor.add_subscriber(prices.clone() as Arc<dyn TickSubscriber>);
        *self.ingestor.write().unwrap_or_else(PoisonError::into_inner) = Some(ingestor.clone());

        let client = self.client.with_cancellation(cancel.clone());
        let mut orchestrator = StartupOrchestrator::new(
            StartupPlan {
                mode: session.mode,
                universe: session.universe.clone(),
                history_days: self.config.candles.history_days,
                min_candle_coverage: self.config.startup.min_candle_coverage,
                warmup: self.config.startup.warmup(),
            },
            UniverseResolver::new(self.config.catalog(), client.clone()),
            client,
            ingestor.clone(),
            candles.clone(),
            prices.clone(),
            self.health.clone(),
        );

        let startup_timeout = self.config.startup.timeout();
        let outcome = match tokio::time::timeout(startup_timeout, orchestrator.run()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(TradingError::Cancelled)) => {
                self.health.record_stop(Some("stopped during startup"));
                self.abandon_startup(&cancel, &ingestor, SessionPhase::Stopped, "stopped during startup")
                    .await;
                return Err(TradingError::Cancelled);
            }
            Ok(Err(e)) => {
                self.abandon_startup(&cancel, &ingestor, SessionPhase::Failed, &e.to_string())
                    .await;
                return Err(e);
            }
            Err(_) => {
                let e = TradingError::Internal(format!("startup timed out after {:?}", startup_timeout));
                self.health.record_fatal(&e.to_string());
                self.abandon_startup(&cancel, &ingestor, SessionPhase::Failed, &e.to_string())
                    .await;
                return Err(e);
            }
        };

        let supervisor = Arc::new(PositionSupervisor::new(
            self.gateway.clone(),
            self.store.clone(),
            self.config.supervisor.trailing.clone(),
            self.clock,
            self.stats.clone(),
        ));
        *self.supervisor.write().unwrap_or_else(PoisonError::into_inner) = Some(supervisor.clone());

        let control = ControlLoop::new(
            ControlConfig {
                mode: session.mode,
                fast_tick: self.config.control.fast_tick(),
                slow_tick_multiple: self.config.control.slow_tick_multiple,
                max_consecutive_errors: self.config.control.max_consecutive_errors,
                capital: session.capital,
            },
            MarketState {
                instruments: Arc::new(outcome.instruments),
                candles,
                prices,
                ingestor: ingestor.clone(),
            },
            Arc::new(ScreeningPipeline::new(self.config.screening.clone())),
            RiskManager::new(self.config.risk.clone(), self.clock),
            supervisor,
            self.store.clone(),
            self.health.clone(),
            self.stats.clone(),
            cancel.clone(),
        );

        // Running before the loop exists, so an immediate exit is never overwritten
        self.health.set_phase(SessionPhase::Running);
        self.journal_phase(SessionPhase::Running, &outcome.verification.summary())
            .await;

        let (commands, command_rx) = mpsc::channel(8);
        let health = self.health.clone();
        let store = self.store.clone();
        let handle = tokio::spawn(async move {
            let result = control.run(command_rx).await;
            if let Err(e) = ingestor.disconnect().await {
                warn!(error = %e, "Feed disconnect failed");
            }
            let detail = match &result {
                Ok(LoopExit::Cancelled) => {
                    health.record_stop(None);
                    "session stopped".to_string()
                }
                Ok(LoopExit::EmergencyStop) => {
                    health.record_stop(Some("emergency stop"));
                    "emergency stop".to_string()
                }
                Err(e) => {
                    health.record_fatal(&e.to_string());
                    e.to_string()
                }
            };
            let phase = health.snapshot().phase;
            let record = JournalRecord::now(JournalEvent::PhaseChanged { phase, detail });
            if let Err(e) = store.append(record).await {
                warn!(error = %e, "Failed to journal");
            }
            result
        });

        *self.session.lock().await = Some(Session {
            cancel,
            commands,
            handle,
        });
        Ok(outcome.verification)
    }

    async fn abandon_startup(
        &self,
        cancel: &CancellationToken,
        ingestor: &LiveFeedIngestor,
        phase: SessionPhase,
        reason: &str,
    ) {
        cancel.cancel();
        if let Err(e) = ingestor.disconnect().await {
            warn!(error = %e, "Feed disconnect failed");
        }
        self.health.set_phase(phase);
        self.journal_phase(phase, reason).await;
    }

    /// Stop the running session, closing every position. A startup in
    /// progress is cancelled. Stopping when nothing runs is a no-op.
    pub async fn stop_session(&self) -> TradingResult<()> {
        let timeout = self.config.control.control_timeout();

        let starting = self.starting.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(cancel) = starting {
            info!("Cancelling session startup");
            cancel.cancel();
        }
        let Ok(_startup) = tokio::time::timeout(timeout, self.startup.lock()).await else {
            error!(?timeout, "Startup did not unwind in time");
            return Err(TradingError::Internal(format!(
                "startup did not unwind within {:?}",
                timeout
            )));
        };

        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        if !session.handle.is_finished() {
            self.health.set_phase(SessionPhase::Stopping);
        }
        session.cancel.cancel();

        let mut handle = session.handle;
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(exit))) => info!(?exit, "Session stopped"),
            Ok(Ok(Err(e))) => info!(error = %e, "Session had already stopped on an error"),
            Ok(Err(join)) => {
                self.health.record_fatal(&format!("control loop panicked: {}", join));
            }
            Err(_) => {
                handle.abort();
                error!(?timeout, "Control loop did not stop in time, aborted");
                self.health
                    .record_fatal(&format!("control loop did not stop within {:?}", timeout));
            }
        }
        Ok(())
    }

    /// Close every open position now, keeping the session running.
    pub async fn force_close_all(&self) -> TradingResult<SupervisionReport> {
        let commands = match self.session.lock().await.as_ref() {
            Some(session) if !session.handle.is_finished() => session.commands.clone(),
            _ => return Ok(SupervisionReport::default()),
        };

        let (reply, response) = oneshot::channel();
        let timeout = self.config.control.control_timeout();
        let request = async {
            commands
                .send(ControlCommand::ForceCloseAll { reply })
                .await
                .map_err(|_| ())?;
            response.await.map_err(|_| ())
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(report)) => Ok(report),
            // The loop ended meanwhile and closed everything itself
            Ok(Err(())) => Ok(SupervisionReport::default()),
            Err(_) => Err(TradingError::Internal(format!(
                "force close did not complete within {:?}",
                timeout
            ))),
        }
    }

    /// Whether a session is currently running.
    pub async fn is_running(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Wait until the running session's control loop exits on its own.
    pub async fn wait_for_exit(&self) {
        let cancel = match self.session.lock().await.as_ref() {
            Some(session) => session.cancel.clone(),
            None => return,
        };
        while self.is_running().await {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.control.fast_tick()) => {}
            }
        }
    }

    pub fn status(&self) -> EngineStatus {
        let supervisor = self
            .supervisor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let feed = self
            .ingestor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|i| i.health());

        EngineStatus {
            health: self.health.snapshot(),
            feed,
            open_positions: supervisor.as_ref().map(|s| s.open_positions()).unwrap_or_default(),
            closed_positions: supervisor.as_ref().map(|s| s.closed_positions()).unwrap_or_default(),
            stats: self.stats.snapshot(),
        }
    }

    async fn journal_phase(&self, phase: SessionPhase, detail: &str) {
        let record = JournalRecord::now(JournalEvent::PhaseChanged {
            phase,
            detail: detail.to_string(),
        });
        if let Err(e) = self.store.append(record).await {
            warn!(error = %e, "Failed to journal");
        }
    }
}
