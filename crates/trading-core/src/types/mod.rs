//! Core data types for the trading engine.

mod candle;
mod health;
mod instrument;
mod journal;
mod order;
mod position;
mod signal;
mod timeframe;

pub use candle::{closes, Candle, PriceTick};
pub use health::{
    EngineHealth, GateStatus, SessionPhase, StartupState, VerificationReport,
};
pub use instrument::{Instrument, OperationClass, TradingMode};
pub use journal::{JournalEvent, JournalRecord};
pub use order::{Fill, OrderPurpose, OrderRequest, Side};
pub use position::{ClosedPosition, ExitReason, Position, PositionStatus};
pub use signal::{Direction, Signal};
pub use timeframe::Timeframe;
