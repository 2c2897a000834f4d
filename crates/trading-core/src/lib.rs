//! Core types and traits for the session trading engine.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (Instrument, Candle, PriceTick)
//! - Signal, order and position lifecycle types
//! - Engine health and journal records
//! - Collaborator traits for the market API, live feed, order gateway and state store

pub mod types;
pub mod traits;
pub mod error;

pub use error::{ApiError, FeedError, RiskViolation, TradingError, TradingResult};
pub use types::*;
pub use traits::*;
