//! Market API trait definition.

use crate::error::ApiError;
use crate::types::{Candle, Fill, Instrument, OrderRequest, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Raw brokerage market-data and trading API.
///
/// Implementations perform exactly one remote request per call. Pacing,
/// retries and timeouts are applied by the caller's rate-limited client.
#[async_trait]
pub trait MarketApi: Send + Sync {
    /// Look up the exchange token for a symbol.
    ///
    /// # Arguments
    /// * `exchange` - Exchange segment, e.g. "NSE"
    /// * `symbol` - Trading symbol
    async fn lookup_token(&self, exchange: &str, symbol: &str) -> Result<String, ApiError>;

    /// Fetch one page of historical candles, oldest first.
    ///
    /// # Arguments
    /// * `instrument` - The resolved instrument
    /// * `interval` - Candle interval
    /// * `from` - Start of the page (inclusive)
    /// * `to` - End of the page (inclusive)
    async fn historical_candles(
        &self,
        instrument: &Instrument,
        interval: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ApiError>;

    /// Place a market order and return its fill.
    async fn place_order(&self, request: &OrderRequest) -> Result<Fill, ApiError>;

    /// Broker health / session check.
    async fn health(&self) -> Result<(), ApiError>;

    /// Get the API name.
    fn name(&self) -> &str;
}
