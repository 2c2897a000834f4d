//! Configuration structures.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use trading_broker::{RateLimitConfig, RestConfig};
use trading_core::error::{TradingError, TradingResult};
use trading_core::types::{Timeframe, TradingMode};
use trading_data::{FeedConfig, UniverseCatalog, UniverseEntry, WsFeedConfig};
use trading_risk::{RiskConfig, SessionClock, TrailingMethod, TrailingStop};
use trading_screening::ScreeningConfig;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub candles: CandleSettings,
    #[serde(default)]
    pub startup: StartupSettings,
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub control: ControlSettings,
    #[serde(default)]
    pub state: StateSettings,
    /// Custom universes, merged over the built-in catalog
    #[serde(default)]
    pub universes: BTreeMap<String, Vec<UniverseEntry>>,
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "session-trader".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
    /// Daily rolling log file, in addition to stdout
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Session mode, universe, capital and exchange hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub mode: TradingMode,
    pub universe: String,
    pub capital: Decimal,
    /// Exchange offset from UTC
    pub utc_offset_minutes: i32,
    pub market_open: String,
    pub last_entry: String,
    pub square_off: String,
    /// Simulated slippage of paper fills
    pub paper_slippage_pct: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            universe: "NIFTY_LEADERS".to_string(),
            capital: dec!(500000),
            utc_offset_minutes: 330,
            market_open: "09:15".to_string(),
            last_entry: "14:45".to_string(),
            square_off: "15:10".to_string(),
            paper_slippage_pct: 0.05,
        }
    }
}

impl SessionSettings {
    pub fn clock(&self) -> TradingResult<SessionClock> {
        SessionClock::new(
            self.utc_offset_minutes,
            &self.market_open,
            &self.last_entry,
            &self.square_off,
        )
    }
}

/// Brokerage REST API settings. Credentials are read from the named
/// environment variables, never from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
    pub request_timeout_ms: u64,
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.example-broker.in".to_string(),
            api_key_env: "BROKER_API_KEY".to_string(),
            api_secret_env: "BROKER_API_SECRET".to_string(),
            request_timeout_ms: 10_000,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ApiSettings {
    /// REST adapter settings with credentials taken from the environment.
    pub fn rest_config(&self) -> TradingResult<RestConfig> {
        Ok(
            RestConfig::from_env(&self.base_url, &self.api_key_env, &self.api_secret_env)?
                .with_timeout(Duration::from_millis(self.request_timeout_ms)),
        )
    }
}

/// Live feed settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub connection: FeedConfig,
    pub websocket: WsFeedConfig,
}

/// Candle series settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleSettings {
    pub interval: Timeframe,
    /// Candles kept per instrument
    pub capacity: usize,
    /// Days of history fetched at startup
    pub history_days: u32,
}

impl Default for CandleSettings {
    fn default() -> Self {
        Self {
            interval: Timeframe::Minute5,
            capacity: 300,
            history_days: 5,
        }
    }
}

/// Startup gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupSettings {
    /// Fraction of resolved symbols that must have candles
    pub min_candle_coverage: f64,
    /// How long to wait for first ticks after subscribing
    pub warmup_ms: u64,
    /// Bound on the whole startup sequence
    pub timeout_ms: u64,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            min_candle_coverage: 0.8,
            warmup_ms: 15_000,
            timeout_ms: 180_000,
        }
    }
}

impl StartupSettings {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Position supervision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub trailing: TrailingStop,
}

/// Control loop cadence and error budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub fast_tick_ms: u64,
    /// Screening runs every `slow_tick_multiple` fast ticks
    pub slow_tick_multiple: u32,
    pub max_consecutive_errors: u32,
    /// Bound on start/stop/force-close operations
    pub control_timeout_ms: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            fast_tick_ms: 1000,
            slow_tick_multiple: 30,
            max_consecutive_errors: 5,
            control_timeout_ms: 15_000,
        }
    }
}

impl ControlSettings {
    pub fn fast_tick(&self) -> Duration {
        Duration::from_millis(self.fast_tick_ms)
    }

    pub fn slow_tick(&self) -> Duration {
        self.fast_tick().saturating_mul(self.slow_tick_multiple.max(1))
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

/// File-backed state: the emergency-stop flag and the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// The session stops while this file exists
    pub emergency_flag_path: PathBuf,
    /// JSON-lines journal
    pub journal_path: PathBuf,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            emergency_flag_path: PathBuf::from("state/EMERGENCY_STOP"),
            journal_path: PathBuf::from("state/journal.jsonl"),
        }
    }
}

impl AppConfig {
    /// Built-in universes plus the ones defined here.
    pub fn catalog(&self) -> UniverseCatalog {
        UniverseCatalog::builtin().with_custom(&self.universes)
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> TradingResult<String> {
        toml::to_string_pretty(self).map_err(|e| TradingError::Serialization(e.to_string()))
    }

    /// Check invariants serde cannot express. Every problem found is
    /// reported in one error.
    pub fn validate(&self) -> TradingResult<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_session(&mut errors);
        self.validate_control(&mut errors);
        self.validate_data(&mut errors);
        self.validate_risk(&mut errors);

        if let Err(e) = self.screening.validate() {
            errors.push(config_message(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TradingError::Config(format!(
                "{} problem{}: {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("; ")
            )))
        }
    }

    fn validate_session(&self, errors: &mut Vec<String>) {
        let session = &self.session;
        if session.capital <= Decimal::ZERO {
            errors.push(format!("session.capital must be positive, got {}", session.capital));
        }
        if session.universe.trim().is_empty() {
            errors.push("session.universe is empty".into());
        } else if !self.catalog().contains(&session.universe) {
            errors.push(format!("session.universe {} is not in the catalog", session.universe));
        }
        if let Err(e) = session.clock() {
            errors.push(config_message(e));
        }
        if !(0.0..5.0).contains(&session.paper_slippage_pct) {
            errors.push("session.paper_slippage_pct must be in [0, 5)".into());
        }
        if session.mode == TradingMode::Live && self.api.base_url.trim().is_empty() {
            errors.push("api.base_url is required in live mode".into());
        }
        for (name, entries) in &self.universes {
            if entries.is_empty() {
                errors.push(format!("universes.{} has no symbols", name));
            }
        }
    }

    fn validate_control(&self, errors: &mut Vec<String>) {
        let control = &self.control;
        if control.fast_tick_ms == 0 {
            errors.push("control.fast_tick_ms must be greater than 0".into());
        }
        if control.slow_tick_multiple == 0 {
            errors.push("control.slow_tick_multiple must be at least 1 (fast tick cannot exceed slow)".into());
        }
        if control.max_consecutive_errors == 0 {
            errors.push("control.max_consecutive_errors must be greater than 0".into());
        }
        if control.control_timeout_ms == 0 {
            errors.push("control.control_timeout_ms must be greater than 0".into());
        }
    }

    fn validate_data(&self, errors: &mut Vec<String>) {
        let coverage = self.startup.min_candle_coverage;
        if !(coverage > 0.0 && coverage <= 1.0) {
            errors.push(format!("startup.min_candle_coverage must be in (0, 1], got {}", coverage));
        }
        if self.startup.timeout_ms <= self.startup.warmup_ms {
            errors.push("startup.timeout_ms must exceed startup.warmup_ms".into());
        }
        if self.candles.capacity < self.screening.lookback_candles {
            errors.push(format!(
                "candles.capacity {} is below screening.lookback_candles {}",
                self.candles.capacity, self.screening.lookback_candles
            ));
        }
        if self.candles.history_days == 0 {
            errors.push("candles.history_days must be greater than 0".into());
        }
        if self.api.rate_limit.max_attempts == 0 {
            errors.push("api.rate_limit.max_attempts must be at least 1".into());
        }
        if self.api.rate_limit.history_page_days <= 0 {
            errors.push("api.rate_limit.history_page_days must be at least 1".into());
        }
        if self.feed.connection.connect_attempts == 0 {
            errors.push("feed.connection.connect_attempts must be at least 1".into());
        }
        if self.session.mode == TradingMode::Live && self.feed.websocket.url.trim().is_empty() {
            errors.push("feed.websocket.url is required in live mode".into());
        }
    }

    fn validate_risk(&self, errors: &mut Vec<String>) {
        if self.risk.max_positions == 0 {
            errors.push("risk.max_positions must be greater than 0".into());
        }
        if self.risk.min_reward_risk <= 0.0 {
            errors.push("risk.min_reward_risk must be positive".into());
        }
        let trailing = &self.supervisor.trailing;
        if trailing.activation_gain_pct < 0.0 {
            errors.push("supervisor.trailing.activation_gain_pct cannot be negative".into());
        }
        let step_ok = match &trailing.method {
            TrailingMethod::Percent { trail_pct } => *trail_pct > 0.0 && *trail_pct < 100.0,
            TrailingMethod::Atr { multiplier } => *multiplier > 0.0,
            TrailingMethod::BreakevenStep { step_pct } => *step_pct > 0.0,
        };
        if !step_ok {
            errors.push(format!("supervisor.trailing method {:?} is out of range", trailing.method));
        }
    }
}

fn config_message(err: TradingError) -> String {
    match err {
        TradingError::Config(msg) => msg,
        other => other.to_string(),
    }
}
