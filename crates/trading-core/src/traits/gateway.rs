//! Order execution and session state collaborators.

use crate::error::TradingResult;
use crate::types::{Fill, JournalRecord, OrderRequest};
use async_trait::async_trait;

/// Executes market orders for the position supervisor.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a market order and wait for its fill.
    async fn submit(&self, request: OrderRequest) -> TradingResult<Fill>;

    /// Get the gateway name.
    fn name(&self) -> &str;
}

/// Configuration/state collaborator polled by the control loop.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Whether an operator has requested an emergency stop.
    async fn emergency_stop(&self) -> TradingResult<bool>;

    /// Append a record to the observability journal.
    async fn append(&self, record: JournalRecord) -> TradingResult<()>;
}
