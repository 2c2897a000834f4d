//! Live order gateway routed through the rate-limited API client.

use async_trait::async_trait;
use tracing::{info, warn};
use trading_core::error::TradingResult;
use trading_core::traits::OrderGateway;
use trading_core::types::{Fill, OrderRequest};

use crate::RateLimitedClient;

/// Sends real orders to the brokerage.
pub struct LiveBroker {
    client: RateLimitedClient,
}

impl LiveBroker {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderGateway for LiveBroker {
    async fn submit(&self, request: OrderRequest) -> TradingResult<Fill> {
        info!(
            client_order_id = %request.client_order_id,
            symbol = %request.symbol,
            side = %request.side,
            quantity = %request.quantity,
            purpose = ?request.purpose,
            "Submitting live order"
        );

        match self.client.place_order(&request).await {
            Ok(fill) => Ok(fill),
            Err(e) => {
                warn!(symbol = %request.symbol, error = %e, "Live order failed");
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "live"
    }
}
