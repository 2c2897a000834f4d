//! Session engine.
//!
//! Runs the gated startup sequence, then a control loop that screens the
//! universe on a slow cadence and supervises open positions on a fast one.
//!
//! # Example
//!
//! ```ignore
//! let engine = Engine::new(config, client, feed, gateway, store)?;
//! let report = engine.start_session().await?;
//! println!("{}", report.summary());
//! engine.stop_session().await?;
//! ```

mod control;
mod engine;
mod health;
mod startup;
mod stats;
mod supervisor;

pub use control::{ControlCommand, ControlConfig, ControlLoop, LoopExit, MarketState};
pub use engine::{Engine, EngineStatus};
pub use health::HealthTracker;
pub use startup::{evaluate_gates, GateInputs, StartupOrchestrator, StartupOutcome, StartupPlan};
pub use stats::{SessionStats, StatsHandle};
pub use supervisor::{PositionSupervisor, Ratchet, SupervisionReport};
