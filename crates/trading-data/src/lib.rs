//! Market data for the trading session.
//!
//! Resolves instrument universes, keeps rolling candle series and latest
//! prices, and ingests the live tick feed.

mod candle_store;
mod feed;
mod price_table;
mod universe;
mod ws_feed;

#[cfg(test)]
mod testing;

pub use candle_store::{CandleStore, IngestOutcome};
pub use feed::{FeedConfig, FeedHealth, LiveFeedIngestor, WarmupReport};
pub use price_table::PriceTable;
pub use universe::{UniverseCatalog, UniverseEntry, UniverseResolver};
pub use ws_feed::{WsFeedConfig, WsMarketFeed};
