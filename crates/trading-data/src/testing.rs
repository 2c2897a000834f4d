//! In-crate fakes for the market API and feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use trading_broker::RateLimitConfig;
use trading_core::error::{ApiError, FeedError};
use trading_core::traits::{FeedEvent, MarketApi, MarketFeed};
use trading_core::types::{Candle, Fill, Instrument, OrderRequest, PriceTick, Timeframe};

#[derive(Default)]
pub struct FakeApi {
    lookup_failures: HashMap<String, ApiError>,
}

impl FakeApi {
    pub fn fast_limits() -> RateLimitConfig {
        RateLimitConfig {
            lookup_interval_ms: 1,
            history_interval_ms: 1,
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            ..Default::default()
        }
    }

    pub fn failing_lookup(mut self, symbol: &str, err: ApiError) -> Self {
        self.lookup_failures.insert(symbol.to_string(), err);
        self
    }
}

#[async_trait]
impl MarketApi for FakeApi {
    async fn lookup_token(&self, _exchange: &str, symbol: &str) -> Result<String, ApiError> {
        match self.lookup_failures.get(symbol) {
            Some(err) => Err(err.clone()),
            None => Ok(format!("tok-{}", symbol)),
        }
    }

    async fn historical_candles(
        &self,
        _instrument: &Instrument,
        _interval: Timeframe,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ApiError> {
        Ok(Vec::new())
    }

    async fn place_order(&self, _request: &OrderRequest) -> Result<Fill, ApiError> {
        Err(ApiError::Status {
            status: 400,
            body: "not supported".into(),
        })
    }

    async fn health(&self) -> Result<(), ApiError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Feed whose connection can be failed, fed and dropped from the test.
#[derive(Default)]
pub struct FakeFeed {
    sink: Mutex<Option<mpsc::Sender<FeedEvent>>>,
    failures_left: AtomicU32,
    pub connects: AtomicU32,
    pub subscriptions: Mutex<Vec<Vec<String>>>,
}

impl FakeFeed {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Default::default()
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<FeedEvent>> {
        self.sink.lock().unwrap().clone()
    }

    pub async fn push(&self, symbol: &str, price: f64, ts: i64) {
        if let Some(tx) = self.sender() {
            let _ = tx.send(FeedEvent::Tick(PriceTick::new(symbol, price, ts, 1.0))).await;
        }
    }

    pub async fn drop_connection(&self, reason: &str) {
        if let Some(tx) = self.sender() {
            let _ = tx.send(FeedEvent::Disconnected(reason.to_string())).await;
        }
    }
}

#[async_trait]
impl MarketFeed for FakeFeed {
    async fn connect(&self, sink: mpsc::Sender<FeedEvent>) -> Result<(), FeedError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(FeedError::Connection("refused".into()));
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn subscribe(&self, instruments: &[Instrument]) -> Result<(), FeedError> {
        if self.sink.lock().unwrap().is_none() {
            return Err(FeedError::NotConnected);
        }
        self.subscriptions
            .lock()
            .unwrap()
            .push(instruments.iter().map(|i| i.symbol.clone()).collect());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), FeedError> {
        self.sink.lock().unwrap().take();
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
