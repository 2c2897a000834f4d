//! Intraday session trading engine CLI.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use trading_config::load_config;
use trading_core::types::TradingMode;
use trading_monitor::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Validation reports its own errors, before logging exists
    if matches!(cli.command, Commands::ValidateConfig) {
        return cli::commands::validate::run(&cli.config).await;
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

    let level = cli
        .log_level
        .map(|l| l.as_str().to_string())
        .unwrap_or_else(|| config.logging.level.clone());
    let json = cli.json_logs || config.logging.is_json();
    let _guard = setup_logging(&level, json, config.logging.file.as_deref().map(Path::new))
        .context("failed to set up logging")?;

    match cli.command {
        Commands::Live(args) => cli::commands::session::run(TradingMode::Live, args, config).await,
        Commands::Paper(args) => cli::commands::session::run(TradingMode::Paper, args, config).await,
        Commands::Universes => cli::commands::universes::run(&config).await,
        Commands::EmergencyStop { reason } => cli::commands::emergency::raise(&config, &reason).await,
        Commands::ClearEmergencyStop => cli::commands::emergency::clear(&config).await,
        Commands::ValidateConfig => Ok(()),
    }
}
