//! Position supervision: entries, exits and the trailing-stop ratchet.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use trading_core::error::{RiskViolation, TradingError, TradingResult};
use trading_core::traits::{OrderGateway, StateStore};
use trading_core::types::{
    ClosedPosition, ExitReason, Instrument, JournalEvent, JournalRecord, OrderPurpose, OrderRequest,
    Position, Signal,
};
use trading_risk::{SessionBook, SessionClock, TrailingStop};

use crate::StatsHandle;

/// A stop move made during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Ratchet {
    pub symbol: String,
    pub from: f64,
    pub to: f64,
}

/// What one supervision pass did.
#[derive(Debug, Default)]
pub struct SupervisionReport {
    pub closed: Vec<ClosedPosition>,
    pub ratchets: Vec<Ratchet>,
    /// Exits whose order failed; those positions are still open
    pub failed_exits: Vec<(String, TradingError)>,
}

impl SupervisionReport {
    pub fn is_clean(&self) -> bool {
        self.failed_exits.is_empty()
    }

    fn absorb(&mut self, other: SupervisionReport) {
        self.closed.extend(other.closed);
        self.ratchets.extend(other.ratchets);
        self.failed_exits.extend(other.failed_exits);
    }
}

struct PendingExit {
    position: Position,
    price: f64,
    reason: ExitReason,
}

/// Owns every open position of the session.
///
/// Exit decisions are made under the positions lock and the affected
/// positions are removed before their orders are sent. The lock is never
/// held across a gateway call.
pub struct PositionSupervisor {
    gateway: Arc<dyn OrderGateway>,
    store: Arc<dyn StateStore>,
    trailing: TrailingStop,
    clock: SessionClock,
    stats: StatsHandle,
    positions: RwLock<BTreeMap<String, Position>>,
    closed: RwLock<Vec<ClosedPosition>>,
}

impl PositionSupervisor {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        store: Arc<dyn StateStore>,
        trailing: TrailingStop,
        clock: SessionClock,
        stats: StatsHandle,
    ) -> Self {
        Self {
            gateway,
            store,
            trailing,
            clock,
            stats,
            positions: RwLock::new(BTreeMap::new()),
            closed: RwLock::new(Vec::new()),
        }
    }

    /// Submit the entry order for `signal` and start supervising the fill.
    pub async fn open(
        &self,
        signal: &Signal,
        instrument: &Instrument,
        quantity: Decimal,
    ) -> TradingResult<Position> {
        if self.is_held(&signal.symbol) {
            return Err(RiskViolation::DuplicateInstrument(signal.symbol.clone()).into());
        }
        if quantity <= Decimal::ZERO {
            return Err(RiskViolation::ZeroQuantity(signal.symbol.clone()).into());
        }

        let request = OrderRequest::market(
            &signal.symbol,
            signal.direction.entry_side(),
            quantity,
            signal.entry_price,
            OrderPurpose::Entry,
        )
        .routed(&instrument.exchange, &instrument.token);
        let fill = self.gateway.submit(request).await?;

        let position = Position::from_fill(signal, instrument, &fill);
        {
            let mut positions = self.positions.write().unwrap_or_else(PoisonError::into_inner);
            if positions.contains_key(&position.symbol) {
                return Err(TradingError::Internal(format!(
                    "{} opened concurrently",
                    position.symbol
                )));
            }
            positions.insert(position.symbol.clone(), position.clone());
        }

        info!(
            symbol = %position.symbol,
            direction = %position.direction,
            quantity = %position.quantity,
            entry = position.entry_price,
            stop = position.stop_loss(),
            target = position.target,
            "Position opened"
        );
        self.stats.update(|s| s.positions_opened += 1);
        self.journal(JournalEvent::PositionOpened {
            position: position.clone(),
        })
        .await;
        Ok(position)
    }

    /// One supervision pass over every open position at `prices`.
    ///
    /// Per position, in order: square-off, target, stop, trailing ratchet.
    pub async fn tick(&self, prices: &HashMap<String, f64>, now: DateTime<Utc>) -> SupervisionReport {
        if self.clock.square_off_due(now) {
            self.stats.update(|s| s.supervision_ticks += 1);
            let pending = self.drain_all(prices, ExitReason::SquareOff);
            if !pending.is_empty() {
                info!(positions = pending.len(), "Square-off time reached, closing everything");
            }
            return self.execute_exits(pending, now).await;
        }

        let mut report = SupervisionReport::default();
        let mut pending = Vec::new();
        {
            let mut positions = self.positions.write().unwrap_or_else(PoisonError::into_inner);
            let mut exiting = Vec::new();

            for (symbol, position) in positions.iter_mut() {
                let Some(&price) = prices.get(symbol).filter(|p| p.is_finite() && **p > 0.0) else {
                    continue;
                };
                position.observe(price);

                if position.target_reached(price) {
                    exiting.push((symbol.clone(), position.target, ExitReason::Target));
                } else if position.stop_breached(price) {
                    exiting.push((symbol.clone(), position.stop_loss(), ExitReason::StopLoss));
                } else if let Some(candidate) = self.trailing.candidate(position, price) {
                    if let Some(from) = position.ratchet_stop(candidate) {
                        report.ratchets.push(Ratchet {
                            symbol: symbol.clone(),
                            from,
                            to: position.stop_loss(),
                        });
                    }
                }
            }

            for (symbol, price, reason) in exiting {
                if let Some(position) = positions.remove(&symbol) {
                    pending.push(PendingExit { position, price, reason });
                }
            }
        }

        for ratchet in &report.ratchets {
            info!(symbol = %ratchet.symbol, from = ratchet.from, to = ratchet.to, "Stop ratcheted");
            self.journal(JournalEvent::StopRatcheted {
                symbol: ratchet.symbol.clone(),
                from: ratchet.from,
                to: ratchet.to,
            })
            .await;
        }
        let ratchets = report.ratchets.len() as u64;
        self.stats.update(|s| {
            s.supervision_ticks += 1;
            s.stop_ratchets += ratchets;
        });

        report.absorb(self.execute_exits(pending, now).await);
        report
    }

    /// Close every open position with `reason`.
    pub async fn close_all(
        &self,
        reason: ExitReason,
        prices: &HashMap<String, f64>,
        now: DateTime<Utc>,
    ) -> SupervisionReport {
        let pending = self.drain_all(prices, reason);
        info!(positions = pending.len(), %reason, "Closing all positions");
        self.stats.update(|s| s.close_all_runs += 1);
        self.execute_exits(pending, now).await
    }

    fn drain_all(&self, prices: &HashMap<String, f64>, reason: ExitReason) -> Vec<PendingExit> {
        let drained = std::mem::take(&mut *self.positions.write().unwrap_or_else(PoisonError::into_inner));
        drained
            .into_values()
            .map(|position| {
                let price = match prices.get(&position.symbol) {
                    Some(p) if p.is_finite() && *p > 0.0 => *p,
                    _ => {
                        warn!(symbol = %position.symbol, "No live price for exit, using best observed");
                        position.best_price
                    }
                };
                PendingExit { position, price, reason }
            })
            .collect()
    }

    async fn execute_exits(&self, pending: Vec<PendingExit>, now: DateTime<Utc>) -> SupervisionReport {
        let mut report = SupervisionReport::default();

        for exit in pending {
            let position = exit.position;
            let request = OrderRequest::market(
                &position.symbol,
                position.direction.exit_side(),
                position.quantity,
                exit.price,
                OrderPurpose::Exit,
            )
            .routed(&position.exchange, &position.token);

            match self.gateway.submit(request).await {
                Ok(fill) => {
                    let closed = position.close(fill.price, exit.reason, now);
                    info!(
                        symbol = %closed.position.symbol,
                        reason = %closed.exit_reason,
                        exit = closed.exit_price,
                        pnl = %closed.realized_pnl,
                        "Position closed"
                    );
                    self.stats.update(|s| s.record_close(&closed));
                    self.closed
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(closed.clone());
                    self.journal(JournalEvent::PositionClosed {
                        closed: closed.clone(),
                    })
                    .await;
                    report.closed.push(closed);
                }
                Err(e) => {
                    error!(symbol = %position.symbol, reason = %exit.reason, error = %e, "Exit order failed, position restored");
                    let symbol = position.symbol.clone();
                    self.positions
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .entry(symbol.clone())
                        .or_insert(position);
                    report.failed_exits.push((symbol, e));
                }
            }
        }

        report
    }

    async fn journal(&self, event: JournalEvent) {
        let record = JournalRecord::now(event);
        let kind = record.kind();
        if let Err(e) = self.store.append(record).await {
            warn!(kind, error = %e, "Failed to journal");
        }
    }

    pub fn is_held(&self, symbol: &str) -> bool {
        self.positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(symbol)
    }

    pub fn open_count(&self) -> usize {
        self.positions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Copies of the open positions, by symbol.
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn closed_positions(&self) -> Vec<ClosedPosition> {
        self.closed.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn held_symbols(&self) -> HashSet<String> {
        self.positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Capital usage for risk checks.
    pub fn book(&self, capital: Decimal) -> SessionBook {
        let open_exposure = self
            .positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|p| p.notional())
            .sum();
        let realized_pnl = self
            .closed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.realized_pnl)
            .sum();
        SessionBook {
            capital,
            open_exposure,
            realized_pnl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use trading_broker::PaperBroker;
    use trading_config::MemoryStateStore;
    use trading_core::types::{Direction, Fill};
    use trading_risk::TrailingMethod;
    use uuid::Uuid;

    /// Paper fills that can be switched to reject.
    struct FlakyGateway {
        inner: PaperBroker,
        reject: AtomicBool,
        submitted: AtomicUsize,
    }

    #[async_trait]
    impl OrderGateway for FlakyGateway {
        async fn submit(&self, request: OrderRequest) -> TradingResult<Fill> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            if self.reject.load(Ordering::SeqCst) {
                return Err(TradingError::Internal("exchange rejected".into()));
            }
            self.inner.submit(request).await
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn signal(symbol: &str, direction: Direction, entry: f64, stop: f64, target: f64) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            sector: "IT".into(),
            direction,
            entry_price: entry,
            stop_loss: stop,
            target,
            score: 1.0,
            atr: 1.0,
            generated_at: Utc::now(),
            tag: "test".into(),
        }
    }

    fn instrument(symbol: &str) -> Instrument {
        Instrument::new(symbol, "NSE", format!("tok-{}", symbol), "IT")
    }

    fn setup(clock: SessionClock) -> (PositionSupervisor, Arc<FlakyGateway>, Arc<MemoryStateStore>, StatsHandle) {
        let gateway = Arc::new(FlakyGateway {
            inner: PaperBroker::new().with_slippage(0.0),
            reject: AtomicBool::new(false),
            submitted: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryStateStore::new());
        let stats = StatsHandle::new();
        let supervisor = PositionSupervisor::new(
            gateway.clone(),
            store.clone(),
            TrailingStop::new(1.0, TrailingMethod::Percent { trail_pct: 1.5 }),
            clock,
            stats.clone(),
        );
        (supervisor, gateway, store, stats)
    }

    fn prices(symbol: &str, price: f64) -> HashMap<String, f64> {
        [(symbol.to_string(), price)].into_iter().collect()
    }

    #[tokio::test]
    async fn test_ratchet_then_stop_out() {
        let (sup, _, store, stats) = setup(SessionClock::always_open());
        sup.open(&signal("INFY", Direction::Long, 100.0, 98.0, 106.0), &instrument("INFY"), dec!(10))
            .await
            .unwrap();

        let mut last_stop = 98.0;
        for price in [100.5, 102.0, 104.0, 103.0] {
            let report = sup.tick(&prices("INFY", price), Utc::now()).await;
            assert!(report.closed.is_empty());
            let stop = sup.open_positions()[0].stop_loss();
            assert!(stop >= last_stop);
            last_stop = stop;
        }
        assert!((last_stop - 104.0 * 0.985).abs() < 1e-9);

        let report = sup.tick(&prices("INFY", 102.0), Utc::now()).await;
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(report.closed[0].exit_price, last_stop);
        assert!(report.closed[0].realized_pnl > Decimal::ZERO);
        assert_eq!(sup.open_count(), 0);

        assert_eq!(stats.snapshot().stop_ratchets, 2);
        assert_eq!(store.records_of("stop_ratcheted").len(), 2);
        assert_eq!(store.records_of("position_closed").len(), 1);
    }

    #[tokio::test]
    async fn test_target_before_stop_and_short_side() {
        let (sup, _, _, _) = setup(SessionClock::always_open());
        sup.open(&signal("TCS", Direction::Short, 100.0, 102.0, 94.0), &instrument("TCS"), dec!(5))
            .await
            .unwrap();

        let report = sup.tick(&prices("TCS", 93.5), Utc::now()).await;
        assert_eq!(report.closed[0].exit_reason, ExitReason::Target);
        assert_eq!(report.closed[0].exit_price, 94.0);
        assert_eq!(report.closed[0].realized_pnl, dec!(30));
    }

    #[tokio::test]
    async fn test_square_off_overrides_everything() {
        // 15:10 IST is 09:40 UTC
        let clock = SessionClock::new(330, "09:15", "14:45", "15:10").unwrap();
        let (sup, _, _, _) = setup(clock);
        sup.open(&signal("SBIN", Direction::Long, 100.0, 98.0, 106.0), &instrument("SBIN"), dec!(10))
            .await
            .unwrap();

        let before = Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap();
        assert!(sup.tick(&prices("SBIN", 101.0), before).await.closed.is_empty());

        let after = Utc.with_ymd_and_hms(2024, 3, 4, 9, 41, 0).unwrap();
        let report = sup.tick(&HashMap::new(), after).await;
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].exit_reason, ExitReason::SquareOff);
        // No price in the snapshot: exits at the best observed price
        assert_eq!(report.closed[0].exit_price, 101.0);
    }

    #[tokio::test]
    async fn test_failed_exit_restores_position() {
        let (sup, gateway, _, _) = setup(SessionClock::always_open());
        sup.open(&signal("INFY", Direction::Long, 100.0, 98.0, 106.0), &instrument("INFY"), dec!(10))
            .await
            .unwrap();

        gateway.reject.store(true, Ordering::SeqCst);
        let report = sup.tick(&prices("INFY", 97.0), Utc::now()).await;
        assert!(!report.is_clean());
        assert_eq!(report.failed_exits[0].0, "INFY");
        assert_eq!(sup.open_count(), 1);

        gateway.reject.store(false, Ordering::SeqCst);
        let report = sup.tick(&prices("INFY", 97.0), Utc::now()).await;
        assert!(report.is_clean());
        assert_eq!(report.closed.len(), 1);
        assert_eq!(sup.closed_positions().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_close_all() {
        let (sup, gateway, _, stats) = setup(SessionClock::always_open());
        sup.open(&signal("INFY", Direction::Long, 100.0, 98.0, 106.0), &instrument("INFY"), dec!(10))
            .await
            .unwrap();
        sup.open(&signal("TCS", Direction::Long, 200.0, 196.0, 212.0), &instrument("TCS"), dec!(5))
            .await
            .unwrap();

        let dup = sup
            .open(&signal("INFY", Direction::Long, 100.0, 98.0, 106.0), &instrument("INFY"), dec!(10))
            .await;
        assert!(matches!(dup, Err(TradingError::Risk(RiskViolation::DuplicateInstrument(_)))));
        assert_eq!(gateway.submitted.load(Ordering::SeqCst), 2);

        let book = sup.book(dec!(100000));
        assert_eq!(book.open_exposure, dec!(2000));

        let report = sup
            .close_all(ExitReason::EmergencyStop, &prices("INFY", 101.0), Utc::now())
            .await;
        assert_eq!(report.closed.len(), 2);
        assert!(report.closed.iter().all(|c| c.exit_reason == ExitReason::EmergencyStop));
        assert_eq!(sup.open_count(), 0);
        assert_eq!(stats.snapshot().close_all_runs, 1);
        assert_eq!(stats.snapshot().positions_closed, 2);
    }
}
