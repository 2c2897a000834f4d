//! Core traits for the trading engine.

mod feed;
mod gateway;
mod indicator;
mod market_api;

pub use feed::{FeedEvent, MarketFeed, TickSubscriber};
pub use gateway::{OrderGateway, StateStore};
pub use indicator::{CandleIndicator, Indicator};
pub use market_api::MarketApi;
