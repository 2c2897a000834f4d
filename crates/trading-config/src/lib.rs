//! Configuration management and session state stores.

mod settings;
mod state;

pub use settings::{
    ApiSettings, AppConfig, AppSettings, CandleSettings, ControlSettings, FeedSettings,
    LoggingConfig, SessionSettings, StartupSettings, StateSettings, SupervisorSettings,
};
pub use state::{FileStateStore, MemoryStateStore};

use config::{Config, Environment, File};
use std::path::Path;
use trading_core::error::{TradingError, TradingResult};

/// Load configuration from file and environment, then validate it.
///
/// Environment variables use the `TRADING` prefix and `__` between
/// sections, e.g. `TRADING__SESSION__MODE=live`.
pub fn load_config(path: &Path) -> TradingResult<AppConfig> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix("TRADING")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| TradingError::Config(e.to_string()))?;

    let app: AppConfig = config
        .try_deserialize()
        .map_err(|e| TradingError::Config(e.to_string()))?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use trading_core::types::{Timeframe, TradingMode};
    use trading_risk::TrailingMethod;

    #[test]
    fn test_load_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
mode = "live"
universe = "NIFTY_IT"
capital = "250000"

[candles]
interval = "15m"

[supervisor.trailing]
activation_gain_pct = 0.5
method = "atr"
multiplier = 2.0

[[universes.MY_PICKS]]
symbol = "TATAMOTORS"
sector = "AUTO"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.session.mode, TradingMode::Live);
        assert_eq!(config.candles.interval, Timeframe::Minute15);
        assert_eq!(config.supervisor.trailing.method, TrailingMethod::Atr { multiplier: 2.0 });
        assert_eq!(config.catalog().get("my_picks").unwrap()[0].exchange, "NSE");
        // Untouched sections keep their defaults
        assert_eq!(config.control.fast_tick_ms, 1000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[startup]\nmin_candle_coverage = 0.0\n").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, TradingError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        assert!(load_config(Path::new("/nonexistent/trading.toml")).is_err());
    }

    #[test]
    fn test_shipped_default_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.session.mode, TradingMode::Paper);
    }
}
