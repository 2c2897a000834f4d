//! Validate configuration command.

use anyhow::Result;
use std::path::Path;
use trading_config::load_config;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    match load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Mode: {}", config.session.mode);
            println!("Universe: {}", config.session.universe);
            println!("Capital: {}", config.session.capital);
            println!(
                "Hours: open {} / last entry {} / square-off {} (UTC{:+} min)",
                config.session.market_open,
                config.session.last_entry,
                config.session.square_off,
                config.session.utc_offset_minutes
            );
            println!("Max positions: {}", config.risk.max_positions);
            println!();
            println!("# Effective configuration");
            println!("{}", config.to_toml()?);
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
