//! Order requests and fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Why an order is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPurpose {
    Entry,
    Exit,
}

/// Market order request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-side order identifier, used for idempotent retries
    pub client_order_id: Uuid,
    /// Symbol to trade
    pub symbol: String,
    /// Exchange token of the symbol
    pub token: String,
    /// Exchange segment
    pub exchange: String,
    /// Buy or sell
    pub side: Side,
    /// Quantity to trade
    pub quantity: Decimal,
    /// Price the decision was made at; used for paper fills and slippage checks
    pub reference_price: f64,
    pub purpose: OrderPurpose,
}

impl OrderRequest {
    /// Create a market order request.
    pub fn market(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        reference_price: f64,
        purpose: OrderPurpose,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.into(),
            token: String::new(),
            exchange: String::new(),
            side,
            quantity,
            reference_price,
            purpose,
        }
    }

    /// Attach the exchange routing information.
    pub fn routed(mut self, exchange: impl Into<String>, token: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self.token = token.into();
        self
    }
}

/// A completed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Broker order ID
    pub order_id: String,
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    /// Average fill price
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_request() {
        let req = OrderRequest::market("SBIN", Side::Buy, dec!(10), 612.5, OrderPurpose::Entry)
            .routed("NSE", "3045");
        assert_eq!(req.symbol, "SBIN");
        assert_eq!(req.token, "3045");
        assert_eq!(req.side.opposite(), Side::Sell);
        assert_eq!(req.purpose, OrderPurpose::Entry);
    }
}
