//! Brokerage integrations.
//!
//! All market-API egress goes through [`RateLimitedClient`]. Orders are
//! executed by an [`OrderGateway`](trading_core::traits::OrderGateway):
//! [`PaperBroker`] fills locally, [`LiveBroker`] routes to the brokerage.

mod live;
mod paper;
mod rate_limit;
mod rest;

pub use live::LiveBroker;
pub use paper::PaperBroker;
pub use rate_limit::{ClientStats, ClientStatsSnapshot, RateLimitConfig, RateLimitedClient};
pub use rest::{RestConfig, RestMarketApi};
