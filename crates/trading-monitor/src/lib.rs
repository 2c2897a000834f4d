//! Logging setup and the terminal status view.

mod dashboard;
mod logging;

pub use dashboard::Dashboard;
pub use logging::setup_logging;
