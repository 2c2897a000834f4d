//! Rate-limited, retrying client in front of the market API.
//!
//! Every outbound request goes through [`RateLimitedClient::call`], which
//! applies per-operation pacing, a per-attempt timeout and exponential
//! backoff on rate-limit and transient failures.
//!
//! Pacing uses one `governor` limiter per [`OperationClass`] with a burst of
//! one, so consecutive attempt starts of a class are at least its minimum
//! interval apart, whatever the previous attempt returned.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use trading_core::error::{ApiError, TradingError, TradingResult};
use trading_core::traits::MarketApi;
use trading_core::types::{Candle, Fill, Instrument, OperationClass, OrderRequest, Timeframe};

/// Pacing and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum spacing between symbol lookups
    pub lookup_interval_ms: u64,
    /// Minimum spacing between historical candle requests
    pub history_interval_ms: u64,
    /// Minimum spacing between quote requests
    pub quote_interval_ms: u64,
    /// Minimum spacing between order placements
    pub order_interval_ms: u64,
    /// Minimum spacing between health checks
    pub health_interval_ms: u64,
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// First backoff delay; doubles on each retry
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay
    pub backoff_max_ms: u64,
    /// Timeout applied to every attempt
    pub call_timeout_ms: u64,
    /// Maximum date range of one historical page
    pub history_page_days: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            lookup_interval_ms: 350,
            history_interval_ms: 340,
            quote_interval_ms: 100,
            order_interval_ms: 120,
            health_interval_ms: 1000,
            max_attempts: 4,
            backoff_base_ms: 1000,
            backoff_max_ms: 8000,
            call_timeout_ms: 10_000,
            history_page_days: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self, class: OperationClass) -> Duration {
        let ms = match class {
            OperationClass::Lookup => self.lookup_interval_ms,
            OperationClass::History => self.history_interval_ms,
            OperationClass::Quote => self.quote_interval_ms,
            OperationClass::Order => self.order_interval_ms,
            OperationClass::Health => self.health_interval_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms)
            .saturating_mul(factor)
            .min(Duration::from_millis(self.backoff_max_ms))
    }
}

/// Limiter allowing one start per `min_interval`. `None` when unpaced.
fn pacer(min_interval: Duration) -> Option<DefaultDirectRateLimiter> {
    Quota::with_period(min_interval).map(RateLimiter::direct)
}

/// Counters exposed for status reporting.
#[derive(Debug, Default)]
pub struct ClientStats {
    pub calls: AtomicU64,
    pub retries: AtomicU64,
    pub rate_limited: AtomicU64,
    pub failures: AtomicU64,
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatsSnapshot {
    pub calls: u64,
    pub retries: u64,
    pub rate_limited: u64,
    pub failures: u64,
}

/// The single egress point to the market API.
///
/// Cheap to clone; clones share pacing state and counters.
#[derive(Clone)]
pub struct RateLimitedClient {
    api: Arc<dyn MarketApi>,
    config: Arc<RateLimitConfig>,
    pacers: Arc<HashMap<OperationClass, DefaultDirectRateLimiter>>,
    stats: Arc<ClientStats>,
    cancel: CancellationToken,
}

impl RateLimitedClient {
    /// Create a new client around `api`.
    pub fn new(api: Arc<dyn MarketApi>, config: RateLimitConfig) -> Self {
        let pacers = OperationClass::all()
            .iter()
            .filter_map(|class| pacer(config.min_interval(*class)).map(|limiter| (*class, limiter)))
            .collect();

        Self {
            api,
            config: Arc::new(config),
            pacers: Arc::new(pacers),
            stats: Arc::new(ClientStats::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// A handle whose waits are interrupted by `token`. Pacing state is shared.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn api_name(&self) -> &str {
        self.api.name()
    }

    pub fn stats(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            calls: self.stats.calls.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
            rate_limited: self.stats.rate_limited.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }

    /// Execute `request` under the pacing and retry policy of `class`.
    ///
    /// `request` is invoked once per attempt. Rate-limit responses and
    /// transient failures are retried with backoff; other API errors are
    /// returned immediately.
    pub async fn call<T, F, Fut>(&self, class: OperationClass, mut request: F) -> TradingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let pacer = self.pacers.get(&class);
        let call_timeout = self.config.call_timeout();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if let Some(pacer) = pacer {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(TradingError::Cancelled),
                    _ = pacer.until_ready() => {}
                }
            }

            self.stats.calls.fetch_add(1, Ordering::Relaxed);
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(TradingError::Cancelled),
                result = tokio::time::timeout(call_timeout, request()) => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(ApiError::Timeout(call_timeout)),
                },
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_rate_limited() {
                self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
                if attempt >= max_attempts {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(operation = %class, attempts = attempt, "Rate limit retries exhausted");
                    return Err(TradingError::RateLimitExceeded {
                        operation: class,
                        attempts: attempt,
                    });
                }
            } else if err.is_transient() {
                if attempt >= max_attempts {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(operation = %class, attempts = attempt, error = %err, "Transient retries exhausted");
                    return Err(TradingError::TransientIo {
                        operation: class,
                        message: err.to_string(),
                    });
                }
            } else {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                return Err(TradingError::Api(err));
            }

            let delay = self
                .config
                .backoff(attempt)
                .max(err.retry_after().unwrap_or_default());
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
            debug!(
                operation = %class,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after backoff"
            );
            self.sleep(delay).await?;
        }
    }

    /// Sleep unless the client's cancellation token fires first.
    async fn sleep(&self, duration: Duration) -> TradingResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TradingError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Look up the exchange token of a symbol.
    pub async fn lookup_token(&self, exchange: &str, symbol: &str) -> TradingResult<String> {
        let api = &self.api;
        self.call(OperationClass::Lookup, || api.lookup_token(exchange, symbol))
            .await
    }

    /// Resolve a catalog entry into a tradable instrument.
    pub async fn lookup_instrument(
        &self,
        exchange: &str,
        symbol: &str,
        sector: &str,
    ) -> TradingResult<Instrument> {
        let token = self.lookup_token(exchange, symbol).await?;
        Ok(Instrument::new(symbol, exchange, token, sector))
    }

    /// Fetch candles for `[from, to]`, split into pages of at most
    /// `history_page_days`. The result is sorted and free of duplicate
    /// timestamps. The last bar may still be forming when `to` is now.
    pub async fn fetch_history(
        &self,
        instrument: &Instrument,
        interval: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TradingResult<Vec<Candle>> {
        let page = chrono::Duration::days(self.config.history_page_days.max(1));
        let api = &self.api;
        let mut candles = Vec::new();
        let mut page_start = from;

        while page_start < to {
            let page_end = (page_start + page).min(to);
            let mut bars = self
                .call(OperationClass::History, || {
                    api.historical_candles(instrument, interval, page_start, page_end)
                })
                .await?;
            debug!(
                symbol = %instrument.symbol,
                from = %page_start,
                to = %page_end,
                bars = bars.len(),
                "Fetched history page"
            );
            candles.append(&mut bars);
            page_start = page_end;
        }

        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
        Ok(candles)
    }

    /// Place a market order.
    pub async fn place_order(&self, request: &OrderRequest) -> TradingResult<Fill> {
        let api = &self.api;
        self.call(OperationClass::Order, || api.place_order(request)).await
    }

    /// Broker health check.
    pub async fn health_check(&self) -> TradingResult<()> {
        let api = &self.api;
        self.call(OperationClass::Health, || api.health()).await
    }
}
