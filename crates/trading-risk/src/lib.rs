//! Risk management for the trading session.
//!
//! Provides position sizing, trailing-stop ratchets, session limits,
//! the exchange session clock, and pre-entry signal validation.

mod portfolio_limits;
mod position_sizer;
mod risk_manager;
mod session_clock;
mod stop_loss;

pub use portfolio_limits::{LimitCheck, PortfolioLimits, SessionBook};
pub use position_sizer::{PositionSizer, PositionSizingMethod};
pub use risk_manager::{RiskConfig, RiskManager};
pub use session_clock::SessionClock;
pub use stop_loss::{TrailingMethod, TrailingStop};
