//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "trading")]
#[command(author, version, about = "Intraday session trading engine")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", env = "TRADING_CONFIG")]
    pub config: PathBuf,

    /// Log level, overriding the configured one
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a live session (real orders)
    Live(SessionArgs),
    /// Start a paper session (simulated fills, live data)
    Paper(SessionArgs),
    /// List the instrument universes available
    Universes,
    /// Validate configuration and print the effective settings
    ValidateConfig,
    /// Raise the emergency stop for a running session
    EmergencyStop {
        /// Recorded in the flag file
        #[arg(long, default_value = "operator request")]
        reason: String,
    },
    /// Clear a raised emergency stop
    ClearEmergencyStop,
}

#[derive(clap::Args)]
pub struct SessionArgs {
    /// Universe to trade, overriding the configured one
    #[arg(short, long)]
    pub universe: Option<String>,

    /// Show the terminal status view instead of waiting for Ctrl-C
    #[arg(long)]
    pub dashboard: bool,

    /// Dashboard refresh interval
    #[arg(long, default_value = "500")]
    pub refresh_ms: u64,
}
