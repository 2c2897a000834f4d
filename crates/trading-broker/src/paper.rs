//! Paper trading gateway: orders fill locally at the reference price.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::{Mutex, PoisonError};
use tracing::info;
use trading_core::error::{ApiError, TradingError, TradingResult};
use trading_core::traits::OrderGateway;
use trading_core::types::{Fill, OrderRequest, Side};
use uuid::Uuid;

/// Paper trading broker for simulation.
pub struct PaperBroker {
    /// Adverse slippage applied to every fill, in percent
    slippage_pct: f64,
    fills: Mutex<Vec<Fill>>,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBroker {
    /// Create a new paper broker with 0.05% slippage.
    pub fn new() -> Self {
        Self {
            slippage_pct: 0.05,
            fills: Mutex::new(Vec::new()),
        }
    }

    /// Set slippage percentage.
    pub fn with_slippage(mut self, slippage_pct: f64) -> Self {
        self.slippage_pct = slippage_pct.max(0.0);
        self
    }

    /// Every fill produced so far, oldest first.
    pub fn fills(&self) -> Vec<Fill> {
        self.fills.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn fill_price(&self, side: Side, reference: f64) -> f64 {
        let slip = self.slippage_pct / 100.0;
        match side {
            Side::Buy => reference * (1.0 + slip),
            Side::Sell => reference * (1.0 - slip),
        }
    }
}

#[async_trait]
impl OrderGateway for PaperBroker {
    async fn submit(&self, request: OrderRequest) -> TradingResult<Fill> {
        if request.quantity <= Decimal::ZERO {
            return Err(TradingError::Api(ApiError::Status {
                status: 400,
                body: format!("invalid quantity {} for {}", request.quantity, request.symbol),
            }));
        }
        if !request.reference_price.is_finite() || request.reference_price <= 0.0 {
            return Err(TradingError::Api(ApiError::Status {
                status: 400,
                body: format!("no reference price for {}", request.symbol),
            }));
        }

        let fill = Fill {
            order_id: format!("paper-{}", Uuid::new_v4()),
            client_order_id: request.client_order_id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price: self.fill_price(request.side, request.reference_price),
            timestamp: Utc::now(),
        };

        info!(
            symbol = %fill.symbol,
            side = %fill.side,
            quantity = %fill.quantity,
            price = fill.price,
            purpose = ?request.purpose,
            "Paper fill"
        );

        self.fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fill.clone());
        Ok(fill)
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trading_core::types::OrderPurpose;

    #[tokio::test]
    async fn test_fill_with_slippage() {
        let broker = PaperBroker::new().with_slippage(0.1);

        let buy = broker
            .submit(OrderRequest::market("SBIN", Side::Buy, dec!(10), 100.0, OrderPurpose::Entry))
            .await
            .unwrap();
        assert!((buy.price - 100.1).abs() < 1e-9);
        assert_eq!(buy.quantity, dec!(10));

        let sell = broker
            .submit(OrderRequest::market("SBIN", Side::Sell, dec!(10), 100.0, OrderPurpose::Exit))
            .await
            .unwrap();
        assert!((sell.price - 99.9).abs() < 1e-9);

        let fills = broker.fills();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].client_order_id, buy.client_order_id);
    }

    #[tokio::test]
    async fn test_rejects_invalid_orders() {
        let broker = PaperBroker::new();
        assert!(broker
            .submit(OrderRequest::market("SBIN", Side::Buy, dec!(0), 100.0, OrderPurpose::Entry))
            .await
            .is_err());
        assert!(broker
            .submit(OrderRequest::market("SBIN", Side::Buy, dec!(1), f64::NAN, OrderPurpose::Entry))
            .await
            .is_err());
        assert!(broker.fills().is_empty());
    }
}
