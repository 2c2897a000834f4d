//! Multi-layer signal screening.
//!
//! Each instrument of the universe passes through ordered layers:
//! - Regime filter (index and sector trend agreement)
//! - Technical screen (trend, volatility band, relative volume, RSI)
//! - Execution validation (stricter re-check at a fresh price)
//!
//! The first rejecting layer ends the evaluation of that instrument.

mod config;
mod context;
mod execution;
mod pipeline;
mod regime;
mod technical;

#[cfg(test)]
mod testing;

pub use config::ScreeningConfig;
pub use context::MarketContext;
pub use execution::ExecutionValidator;
pub use pipeline::{Candidate, Rejection, ScreeningLayer, ScreeningPipeline, ScreeningReport};
pub use regime::RegimeFilter;
pub use technical::TechnicalScreen;
