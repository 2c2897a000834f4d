//! HTTP adapter for the brokerage market API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trading_core::error::{ApiError, TradingError, TradingResult};
use trading_core::traits::MarketApi;
use trading_core::types::{Candle, Fill, Instrument, OrderRequest, Timeframe};
use uuid::Uuid;

/// REST API connection settings.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Transport-level timeout; the rate-limited client applies its own per attempt
    pub request_timeout: Duration,
}

impl RestConfig {
    /// Create config directly with key and secret.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Load credentials from the named environment variables.
    pub fn from_env(base_url: &str, key_var: &str, secret_var: &str) -> TradingResult<Self> {
        let api_key = std::env::var(key_var)
            .map_err(|_| TradingError::Config(format!("{} not set", key_var)))?;
        let api_secret = std::env::var(secret_var)
            .map_err(|_| TradingError::Config(format!("{} not set", secret_var)))?;

        Ok(Self::new(base_url, api_key, api_secret))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    symbol: String,
    token: String,
    exchange: String,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    data: Vec<CandleRow>,
}

/// `[timestamp, open, high, low, close, volume]`
#[derive(Debug, Deserialize)]
struct CandleRow(String, f64, f64, f64, f64, f64);

#[derive(Debug, Serialize)]
struct CreateOrder<'a> {
    client_order_id: Uuid,
    exchange: &'a str,
    token: &'a str,
    symbol: &'a str,
    side: String,
    quantity: String,
    order_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
    status: String,
    average_price: Option<f64>,
    filled_quantity: Option<String>,
    filled_at: Option<String>,
}

/// Brokerage REST client.
pub struct RestMarketApi {
    config: RestConfig,
    client: Client,
}

impl RestMarketApi {
    /// Create a new REST client.
    pub fn new(config: RestConfig) -> TradingResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "X-API-KEY",
            header::HeaderValue::from_str(&config.api_key)
                .map_err(|e| TradingError::Config(e.to_string()))?,
        );
        headers.insert(
            "X-API-SECRET",
            header::HeaderValue::from_str(&config.api_secret)
                .map_err(|e| TradingError::Config(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TradingError::Config(e.to_string()))?;

        info!(base_url = %config.base_url(), "Market API client ready");
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    fn transport_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.config.request_timeout)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Map a non-success response onto the API error taxonomy.
async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = resp
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = resp.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited { retry_after },
        StatusCode::NOT_FOUND => ApiError::NotFound(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(body),
        s if s.is_server_error() => ApiError::Server {
            status: s.as_u16(),
            body,
        },
        s => ApiError::Status {
            status: s.as_u16(),
            body,
        },
    })
}

fn parse_timestamp(value: &str) -> Result<i64, ApiError> {
    if let Ok(ms) = value.parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| ApiError::Decode(format!("bad timestamp '{}': {}", value, e)))
}

#[async_trait]
impl MarketApi for RestMarketApi {
    async fn lookup_token(&self, exchange: &str, symbol: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .get(self.url("/v1/instruments/search"))
            .query(&[("exchange", exchange), ("symbol", symbol)])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let resp = check_status(resp).await?;

        let data: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        data.data
            .into_iter()
            .find(|hit| hit.symbol.eq_ignore_ascii_case(symbol) && hit.exchange.eq_ignore_ascii_case(exchange))
            .map(|hit| hit.token)
            .ok_or_else(|| ApiError::NotFound(format!("{}:{}", exchange, symbol)))
    }

    async fn historical_candles(
        &self,
        instrument: &Instrument,
        interval: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ApiError> {
        let params = [
            ("exchange", instrument.exchange.clone()),
            ("token", instrument.token.clone()),
            ("interval", interval.api_code().to_string()),
            ("from", from.to_rfc3339()),
            ("to", to.to_rfc3339()),
        ];

        let resp = self
            .client
            .get(self.url("/v1/candles"))
            .query(&params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let resp = check_status(resp).await?;

        let data: CandlesResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        let candles = data
            .data
            .iter()
            .map(|row| {
                let ts = parse_timestamp(&row.0)?;
                Ok(Candle::new(ts, interval, row.1, row.2, row.3, row.4, row.5))
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        debug!(symbol = %instrument.symbol, bars = candles.len(), "Historical candles received");
        Ok(candles)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Fill, ApiError> {
        let body = CreateOrder {
            client_order_id: request.client_order_id,
            exchange: &request.exchange,
            token: &request.token,
            symbol: &request.symbol,
            side: request.side.to_string(),
            quantity: request.quantity.to_string(),
            order_type: "MARKET",
        };

        let resp = self
            .client
            .post(self.url("/v1/orders"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let resp = check_status(resp).await?;

        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        if !matches!(order.status.to_ascii_lowercase().as_str(), "filled" | "complete") {
            return Err(ApiError::Status {
                status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                body: format!("order {} not filled: {}", order.order_id, order.status),
            });
        }

        let price = order
            .average_price
            .ok_or_else(|| ApiError::Decode(format!("order {} has no fill price", order.order_id)))?;
        let quantity = order
            .filled_quantity
            .as_deref()
            .and_then(|q| q.parse::<Decimal>().ok())
            .unwrap_or(request.quantity);
        let timestamp = order
            .filled_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        info!(
            order_id = %order.order_id,
            symbol = %request.symbol,
            side = %request.side,
            %quantity,
            price,
            "Order filled"
        );

        Ok(Fill {
            order_id: order.order_id,
            client_order_id: request.client_order_id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity,
            price,
            timestamp,
        })
    }

    async fn health(&self) -> Result<(), ApiError> {
        let resp = self
            .client
            .get(self.url("/v1/health"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        check_status(resp).await.map(|_| ())
    }

    fn name(&self) -> &str {
        "rest"
    }
}
