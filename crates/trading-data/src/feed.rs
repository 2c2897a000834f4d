//! Live feed ingestion: connection lifecycle and tick dispatch.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trading_core::error::{FeedError, TradingError, TradingResult};
use trading_core::traits::{FeedEvent, MarketFeed, TickSubscriber};
use trading_core::types::{Instrument, PriceTick};

/// Feed connection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Connection attempts before giving up
    pub connect_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Timeout of a single connection attempt
    pub connect_timeout_ms: u64,
    /// Buffered events between the connection and the dispatcher
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            connect_timeout_ms: 10_000,
            channel_capacity: 4096,
        }
    }
}

impl FeedConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms)
            .saturating_mul(factor)
            .min(Duration::from_millis(self.backoff_max_ms))
    }
}

/// Connection health counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedHealth {
    pub connected: bool,
    pub ticks_received: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub reconnects: u64,
}

/// Outcome of waiting for first prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupReport {
    pub subscribed: usize,
    pub with_price: usize,
    /// Subscribed symbols still without a tick
    pub missing: Vec<String>,
    pub waited: Duration,
}

impl WarmupReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

struct Shared {
    feed: Arc<dyn MarketFeed>,
    config: FeedConfig,
    cancel: CancellationToken,
    subscribers: RwLock<Vec<Arc<dyn TickSubscriber>>>,
    subscribed: RwLock<Vec<Instrument>>,
    priced: RwLock<HashSet<String>>,
    connected: AtomicBool,
    ticks: AtomicU64,
    last_tick_ms: AtomicI64,
    reconnects: AtomicU64,
}

impl Shared {
    /// Connect with bounded, cancellable exponential backoff.
    async fn connect_with_retry(&self) -> TradingResult<mpsc::Receiver<FeedEvent>> {
        let attempts = self.config.connect_attempts.max(1);
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(TradingError::Cancelled),
                r = tokio::time::timeout(timeout, self.feed.connect(tx)) => r,
            };

            match result {
                Ok(Ok(())) => {
                    self.connected.store(true, Ordering::SeqCst);
                    info!(feed = %self.feed.name(), attempt, "Market feed connected");
                    return Ok(rx);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("connect timed out after {:?}", timeout),
            }

            warn!(feed = %self.feed.name(), attempt, error = %last_error, "Feed connection failed");
            if attempt < attempts {
                let delay = self.config.backoff(attempt);
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(TradingError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(TradingError::FeedUnavailable(format!(
            "{} after {} attempts: {}",
            self.feed.name(),
            attempts,
            last_error
        )))
    }

    async fn reconnect(&self) -> TradingResult<mpsc::Receiver<FeedEvent>> {
        let rx = self.connect_with_retry().await?;
        let instruments = self
            .subscribed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if !instruments.is_empty() {
            self.feed.subscribe(&instruments).await?;
        }
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        info!(instruments = instruments.len(), "Feed reconnected and resubscribed");
        Ok(rx)
    }

    fn dispatch(&self, tick: &PriceTick) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_tick_ms.store(tick.timestamp, Ordering::Relaxed);

        let seen = self
            .priced
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&tick.symbol);
        if !seen {
            self.priced
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(tick.symbol.clone());
        }

        let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        for subscriber in subscribers.iter() {
            subscriber.on_tick(tick);
        }
    }
}

/// Owns the feed connection and pushes every tick to its subscribers.
pub struct LiveFeedIngestor {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl LiveFeedIngestor {
    pub fn new(feed: Arc<dyn MarketFeed>, config: FeedConfig, cancel: CancellationToken) -> Self {
        Self {
            shared: Arc::new(Shared {
                feed,
                config,
                cancel,
                subscribers: RwLock::new(Vec::new()),
                subscribed: RwLock::new(Vec::new()),
                priced: RwLock::new(HashSet::new()),
                connected: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                last_tick_ms: AtomicI64::new(0),
                reconnects: AtomicU64::new(0),
            }),
            dispatcher: Mutex::new(None),
        }
    }

    /// Register a receiver of dispatched ticks.
    pub fn add_subscriber(&self, subscriber: Arc<dyn TickSubscriber>) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Connect and start the dispatch task. Connecting twice is a no-op.
    pub async fn connect(&self) -> TradingResult<()> {
        let mut dispatcher = self.dispatcher.lock().await;
        if self.is_connected() && dispatcher.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let rx = self.shared.connect_with_retry().await?;
        if let Some(old) = dispatcher.take() {
            old.abort();
        }
        *dispatcher = Some(tokio::spawn(run_dispatcher(self.shared.clone(), rx)));
        Ok(())
    }

    /// Subscribe to ticks. Subscriptions survive reconnects.
    pub async fn subscribe(&self, instruments: &[Instrument]) -> TradingResult<()> {
        if !self.is_connected() {
            return Err(TradingError::Feed(FeedError::NotConnected));
        }

        {
            let mut subscribed = self
                .shared
                .subscribed
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for instrument in instruments {
                if !subscribed.iter().any(|i| i.symbol == instrument.symbol) {
                    subscribed.push(instrument.clone());
                }
            }
        }

        self.shared.feed.subscribe(instruments).await?;
        info!(instruments = instruments.len(), "Subscribed to live ticks");
        Ok(())
    }

    /// Stop dispatching and close the connection. Safe to call repeatedly.
    pub async fn disconnect(&self) -> TradingResult<()> {
        if let Some(handle) = self.dispatcher.lock().await.take() {
            handle.abort();
        }
        let was_connected = self.shared.connected.swap(false, Ordering::SeqCst);
        self.shared.feed.disconnect().await?;
        if was_connected {
            info!(feed = %self.shared.feed.name(), "Market feed disconnected");
        }
        Ok(())
    }

    /// Wait until every subscribed instrument has ticked, or `window` elapses.
    pub async fn wait_for_warmup(&self, window: Duration) -> TradingResult<WarmupReport> {
        let started = Instant::now();
        let poll = Duration::from_millis(25);

        loop {
            let report = self.warmup_report(started.elapsed());
            if report.is_complete() || started.elapsed() >= window {
                debug!(
                    with_price = report.with_price,
                    subscribed = report.subscribed,
                    "Warm-up finished"
                );
                return Ok(report);
            }

            let remaining = window.saturating_sub(started.elapsed());
            tokio::select! {
                _ = self.shared.cancel.cancelled() => return Err(TradingError::Cancelled),
                _ = tokio::time::sleep(poll.min(remaining)) => {}
            }
        }
    }

    fn warmup_report(&self, waited: Duration) -> WarmupReport {
        let subscribed = self
            .shared
            .subscribed
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let priced = self.shared.priced.read().unwrap_or_else(PoisonError::into_inner);
        let missing: Vec<String> = subscribed
            .iter()
            .filter(|i| !priced.contains(&i.symbol))
            .map(|i| i.symbol.clone())
            .collect();

        WarmupReport {
            subscribed: subscribed.len(),
            with_price: subscribed.len() - missing.len(),
            missing,
            waited,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> FeedHealth {
        let ticks_received = self.shared.ticks.load(Ordering::Relaxed);
        let last_ms = self.shared.last_tick_ms.load(Ordering::Relaxed);
        FeedHealth {
            connected: self.is_connected(),
            ticks_received,
            last_tick_at: (ticks_received > 0)
                .then(|| Utc.timestamp_millis_opt(last_ms).single())
                .flatten(),
            reconnects: self.shared.reconnects.load(Ordering::Relaxed),
        }
    }
}

async fn run_dispatcher(shared: Arc<Shared>, mut rx: mpsc::Receiver<FeedEvent>) {
    loop {
        let event = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            event = rx.recv() => event,
        };

        let reason = match event {
            Some(FeedEvent::Tick(tick)) => {
                shared.dispatch(&tick);
                continue;
            }
            Some(FeedEvent::Disconnected(reason)) => reason,
            None => "event channel closed".to_string(),
        };

        shared.connected.store(false, Ordering::SeqCst);
        warn!(reason = %reason, "Market feed disconnected, reconnecting");

        match shared.reconnect().await {
            Ok(new_rx) => rx = new_rx,
            Err(TradingError::Cancelled) => break,
            Err(e) => {
                error!(error = %e, "Market feed reconnection failed");
                break;
            }
        }
    }
    debug!("Feed dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFeed;
    use crate::{CandleStore, PriceTable};
    use trading_core::types::Timeframe;

    fn config() -> FeedConfig {
        FeedConfig {
            connect_attempts: 3,
            backoff_base_ms: 5,
            backoff_max_ms: 20,
            connect_timeout_ms: 500,
            channel_capacity: 64,
        }
    }

    fn instruments() -> Vec<Instrument> {
        vec![
            Instrument::new("SBIN", "NSE", "1", "PSU_BANK"),
            Instrument::new("INFY", "NSE", "2", "IT"),
        ]
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_connect_retries_then_succeeds() {
        let feed = Arc::new(FakeFeed::failing(2));
        let ingestor = LiveFeedIngestor::new(feed.clone(), config(), CancellationToken::new());

        ingestor.connect().await.unwrap();
        assert!(ingestor.is_connected());
        assert_eq!(feed.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_exhaustion_is_feed_unavailable() {
        let feed = Arc::new(FakeFeed::failing(10));
        let ingestor = LiveFeedIngestor::new(feed, config(), CancellationToken::new());

        let err = ingestor.connect().await.unwrap_err();
        assert!(matches!(err, TradingError::FeedUnavailable(_)));
        assert!(!ingestor.is_connected());
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let ingestor = LiveFeedIngestor::new(Arc::new(FakeFeed::default()), config(), CancellationToken::new());
        let err = ingestor.subscribe(&instruments()).await.unwrap_err();
        assert!(matches!(err, TradingError::Feed(FeedError::NotConnected)));
    }

    #[tokio::test]
    async fn test_ticks_dispatched_to_subscribers() {
        let feed = Arc::new(FakeFeed::default());
        let ingestor = LiveFeedIngestor::new(feed.clone(), config(), CancellationToken::new());
        let candles = Arc::new(CandleStore::new(Timeframe::Minute1, 10));
        let prices = Arc::new(PriceTable::new());
        ingestor.add_subscriber(candles.clone());
        ingestor.add_subscriber(prices.clone());

        ingestor.connect().await.unwrap();
        ingestor.subscribe(&instruments()).await.unwrap();
        feed.push("SBIN", 600.0, 1_000).await;
        feed.push("SBIN", 601.0, 2_000).await;
        settle().await;

        assert_eq!(prices.get("SBIN"), Some(601.0));
        assert!(candles.has_candles("SBIN"));

        let health = ingestor.health();
        assert_eq!(health.ticks_received, 2);
        assert!(health.last_tick_at.is_some());

        let report = ingestor.wait_for_warmup(Duration::from_millis(50)).await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.missing, vec!["INFY".to_string()]);

        feed.push("INFY", 1500.0, 2_500).await;
        let report = ingestor.wait_for_warmup(Duration::from_secs(2)).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.with_price, 2);
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes() {
        let feed = Arc::new(FakeFeed::default());
        let ingestor = LiveFeedIngestor::new(feed.clone(), config(), CancellationToken::new());
        let prices = Arc::new(PriceTable::new());
        ingestor.add_subscriber(prices.clone());

        ingestor.connect().await.unwrap();
        ingestor.subscribe(&instruments()).await.unwrap();
        feed.drop_connection("server restart").await;
        settle().await;

        assert!(ingestor.is_connected());
        assert_eq!(ingestor.health().reconnects, 1);
        assert_eq!(feed.connects.load(Ordering::SeqCst), 2);
        let subs = feed.subscriptions.lock().unwrap().clone();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1], vec!["SBIN".to_string(), "INFY".to_string()]);

        feed.push("SBIN", 610.0, 5_000).await;
        settle().await;
        assert_eq!(prices.get("SBIN"), Some(610.0));
    }

    #[tokio::test]
    async fn test_warmup_cancellable_and_disconnect_idempotent() {
        let cancel = CancellationToken::new();
        let feed = Arc::new(FakeFeed::default());
        let ingestor = Arc::new(LiveFeedIngestor::new(feed, config(), cancel.clone()));
        ingestor.connect().await.unwrap();
        ingestor.subscribe(&instruments()).await.unwrap();

        let waiting = {
            let ingestor = ingestor.clone();
            tokio::spawn(async move { ingestor.wait_for_warmup(Duration::from_secs(30)).await })
        };
        settle().await;
        cancel.cancel();
        assert!(matches!(waiting.await.unwrap(), Err(TradingError::Cancelled)));

        ingestor.disconnect().await.unwrap();
        ingestor.disconnect().await.unwrap();
        assert!(!ingestor.is_connected());
    }
}
