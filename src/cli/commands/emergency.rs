//! Emergency stop flag commands.

use anyhow::{Context, Result};
use trading_config::{AppConfig, FileStateStore};

pub async fn raise(config: &AppConfig, reason: &str) -> Result<()> {
    let store = FileStateStore::from_settings(&config.state);
    store
        .trigger_emergency_stop(reason)
        .await
        .context("failed to raise the emergency stop")?;
    println!(
        "Emergency stop raised at {:?}; a running session closes everything on its next tick.",
        config.state.emergency_flag_path
    );
    Ok(())
}

pub async fn clear(config: &AppConfig) -> Result<()> {
    let store = FileStateStore::from_settings(&config.state);
    store
        .clear_emergency_stop()
        .await
        .context("failed to clear the emergency stop")?;
    println!("Emergency stop cleared.");
    Ok(())
}
