//! Scripted collaborators shared by the engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use trading_broker::{PaperBroker, RateLimitConfig, RateLimitedClient};
use trading_config::{AppConfig, MemoryStateStore};
use trading_core::error::{ApiError, FeedError};
use trading_core::traits::{FeedEvent, MarketApi, MarketFeed, OrderGateway, StateStore};
use trading_core::types::{
    Candle, Direction, Fill, Instrument, OrderRequest, PriceTick, Signal, Timeframe, TradingMode,
};
use trading_data::{CandleStore, FeedConfig, LiveFeedIngestor, PriceTable, UniverseEntry};
use trading_engine::{Engine, MarketState};
use uuid::Uuid;

pub const UNIVERSE: &str = "TEST3";

/// Market API with scripted lookups and a flat, slightly rising history.
#[derive(Default)]
pub struct ScriptedApi {
    lookup_failures: HashSet<String>,
    history_fails: bool,
}

impl ScriptedApi {
    pub fn failing_lookup(mut self, symbol: &str) -> Self {
        self.lookup_failures.insert(symbol.to_string());
        self
    }

    pub fn failing_history(mut self) -> Self {
        self.history_fails = true;
        self
    }
}

#[async_trait]
impl MarketApi for ScriptedApi {
    async fn lookup_token(&self, _exchange: &str, symbol: &str) -> Result<String, ApiError> {
        if self.lookup_failures.contains(symbol) {
            return Err(ApiError::NotFound(symbol.to_string()));
        }
        Ok(format!("tok-{}", symbol))
    }

    async fn historical_candles(
        &self,
        instrument: &Instrument,
        interval: Timeframe,
        _from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ApiError> {
        if self.history_fails {
            return Err(ApiError::NotFound(format!("history for {}", instrument.symbol)));
        }
        let step = interval.as_millis();
        let last = interval.bucket_start(to.timestamp_millis()) - step;
        Ok((0..30)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.1;
                Candle::new(last - (29 - i) * step, interval, close - 0.05, close + 0.2, close - 0.2, close, 1000.0)
            })
            .collect())
    }

    async fn place_order(&self, _request: &OrderRequest) -> Result<Fill, ApiError> {
        Err(ApiError::Status {
            status: 400,
            body: "orders go through the paper broker".into(),
        })
    }

    async fn health(&self) -> Result<(), ApiError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Feed that connects instantly and, when `ticking`, sends one tick per
/// instrument on subscribe. An unreachable feed refuses every connection.
pub struct ScriptedFeed {
    ticking: bool,
    reachable: bool,
    sink: Mutex<Option<mpsc::Sender<FeedEvent>>>,
    connected: AtomicBool,
}

impl ScriptedFeed {
    pub fn ticking() -> Self {
        Self {
            ticking: true,
            reachable: true,
            sink: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn silent() -> Self {
        Self {
            ticking: false,
            ..Self::ticking()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::silent()
        }
    }
}

#[async_trait]
impl MarketFeed for ScriptedFeed {
    async fn connect(&self, sink: mpsc::Sender<FeedEvent>) -> Result<(), FeedError> {
        if !self.reachable {
            return Err(FeedError::Connection("connection refused".into()));
        }
        *self.sink.lock().unwrap() = Some(sink);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, instruments: &[Instrument]) -> Result<(), FeedError> {
        if !self.ticking {
            return Ok(());
        }
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            let now = Utc::now().timestamp_millis();
            for instrument in instruments {
                let _ = sink.try_send(FeedEvent::Tick(PriceTick::new(&instrument.symbol, 103.0, now, 10.0)));
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), FeedError> {
        self.sink.lock().unwrap().take();
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn fast_limits() -> RateLimitConfig {
    RateLimitConfig {
        lookup_interval_ms: 1,
        history_interval_ms: 1,
        quote_interval_ms: 1,
        order_interval_ms: 1,
        health_interval_ms: 1,
        max_attempts: 1,
        backoff_base_ms: 1,
        backoff_max_ms: 2,
        ..Default::default()
    }
}

/// Valid config over the three-symbol test universe with short timings.
pub fn config(mode: TradingMode) -> AppConfig {
    let mut config = AppConfig::default();
    config.session.mode = mode;
    config.session.universe = UNIVERSE.to_string();
    config.api.rate_limit = fast_limits();
    config.feed.websocket.url = "ws://127.0.0.1:1/feed".to_string();
    config.feed.connection.connect_attempts = 1;
    config.startup.warmup_ms = 200;
    config.startup.timeout_ms = 5_000;
    config.control.fast_tick_ms = 20;
    config.control.slow_tick_multiple = 5;
    config.control.control_timeout_ms = 2_000;
    config.universes.insert(
        UNIVERSE.to_string(),
        vec![
            UniverseEntry::new("AAA", "IT"),
            UniverseEntry::new("BBB", "BANK"),
            UniverseEntry::new("CCC", "AUTO"),
        ],
    );
    config
}

pub fn engine(
    config: AppConfig,
    api: ScriptedApi,
    feed: ScriptedFeed,
    store: Arc<MemoryStateStore>,
) -> Engine {
    let client = RateLimitedClient::new(Arc::new(api), config.api.rate_limit.clone());
    let gateway: Arc<dyn OrderGateway> = Arc::new(PaperBroker::new().with_slippage(0.0));
    Engine::new(config, client, Arc::new(feed), gateway, store as Arc<dyn StateStore>).unwrap()
}

/// Market state over pre-filled prices, with an idle feed.
pub fn market(symbols: &[&str], price: f64) -> MarketState {
    let prices = Arc::new(PriceTable::new());
    let now = Utc::now().timestamp_millis();
    for symbol in symbols {
        prices.update(symbol, price, now);
    }
    let ingestor = LiveFeedIngestor::new(
        Arc::new(ScriptedFeed::silent()),
        FeedConfig::default(),
        CancellationToken::new(),
    );
    MarketState {
        instruments: Arc::new(symbols.iter().map(|s| instrument(s)).collect()),
        candles: Arc::new(CandleStore::new(Timeframe::Minute5, 100)),
        prices,
        ingestor: Arc::new(ingestor),
    }
}

/// 60 five-minute candles rising 0.08 per bar around a 0.3 zigzag, the last
/// one trading twice the usual volume.
pub fn trending_candles() -> Vec<Candle> {
    (0..60)
        .map(|i| {
            let wiggle = if i % 2 == 0 { 0.3 } else { -0.3 };
            let close = 100.0 + 0.08 * i as f64 + wiggle;
            let volume = if i == 59 { 2000.0 } else { 1000.0 };
            Candle::new(i * 300_000, Timeframe::Minute5, close, close + 0.4, close - 0.4, close, volume)
        })
        .collect()
}

/// Market state with a trending history for `symbol`, priced at its last close.
pub fn trending_market(symbol: &str) -> MarketState {
    let bars = trending_candles();
    let last_close = bars[bars.len() - 1].close;
    let market = market(&[symbol], last_close);
    market.candles.bootstrap(symbol, bars);
    market
}

/// Poll `check` for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn instrument(symbol: &str) -> Instrument {
    Instrument::new(symbol, "NSE", format!("tok-{}", symbol), "IT")
}

pub fn long_signal(symbol: &str, entry: f64, stop: f64, target: f64) -> Signal {
    Signal {
        id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        sector: "IT".to_string(),
        direction: Direction::Long,
        entry_price: entry,
        stop_loss: stop,
        target,
        score: 1.0,
        atr: 1.0,
        generated_at: Utc::now(),
        tag: "test".to_string(),
    }
}

pub fn prices_of(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
}

pub fn capital() -> Decimal {
    Decimal::from(1_000_000)
}
