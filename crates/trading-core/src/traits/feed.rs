//! Live market feed trait definitions.

use crate::error::FeedError;
use crate::types::{Instrument, PriceTick};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Event pushed by a market feed connection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A price update for a subscribed instrument
    Tick(PriceTick),
    /// The connection dropped; no further events until reconnected
    Disconnected(String),
}

/// Push-based live market-data connection.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Open a connection. Events are delivered to `sink` until the
    /// connection drops or [`MarketFeed::disconnect`] is called.
    async fn connect(&self, sink: mpsc::Sender<FeedEvent>) -> Result<(), FeedError>;

    /// Subscribe to ticks for the given instruments.
    ///
    /// Ticks must not be assumed to arrive before this returns.
    async fn subscribe(&self, instruments: &[Instrument]) -> Result<(), FeedError>;

    /// Close the connection. Closing a closed connection is a no-op.
    async fn disconnect(&self) -> Result<(), FeedError>;

    /// Get the feed name.
    fn name(&self) -> &str;
}

/// Receiver of dispatched ticks.
///
/// Called on the feed dispatch task; implementations must not block on I/O.
pub trait TickSubscriber: Send + Sync {
    fn on_tick(&self, tick: &PriceTick);
}
