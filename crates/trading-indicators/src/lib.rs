//! Technical indicators used by the screening layers.
//!
//! This crate provides implementations of the indicators the screens rely on:
//! - EMA and EMA-spread trend strength
//! - RSI
//! - Volatility and volume (ATR, relative volume)

pub mod momentum;
pub mod moving_average;
pub mod volatility;

pub use momentum::Rsi;
pub use moving_average::{trend_strength, Ema};
pub use volatility::{relative_volume, Atr};
