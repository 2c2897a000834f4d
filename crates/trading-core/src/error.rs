//! Error types for the trading engine.

use std::time::Duration;

use thiserror::Error;

use crate::types::OperationClass;

/// Top-level trading engine error.
#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown universe: {0}")]
    UnknownUniverse(String),

    #[error("No instruments resolved for universe {universe} ({attempted} attempted)")]
    NoInstrumentsResolved { universe: String, attempted: usize },

    #[error("Rate limit exceeded for {operation} after {attempts} attempts")]
    RateLimitExceeded {
        operation: OperationClass,
        attempts: u32,
    },

    #[error("Market feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Pre-trade verification failed: {0}")]
    VerificationFailed(String),

    #[error("Transient I/O error during {operation}: {message}")]
    TransientIo {
        operation: OperationClass,
        message: String,
    },

    #[error("Risk violation: {0}")]
    Risk(#[from] RiskViolation),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Stopping after {consecutive} consecutive errors, last: {last}")]
    ErrorBudgetExhausted { consecutive: u32, last: String },

    #[error("A session is already running")]
    SessionAlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Insufficient data: need {required}, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradingError {
    /// Whether this error should stop the whole session rather than a single
    /// instrument or a single tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TradingError::Config(_)
                | TradingError::UnknownUniverse(_)
                | TradingError::NoInstrumentsResolved { .. }
                | TradingError::FeedUnavailable(_)
                | TradingError::VerificationFailed(_)
                | TradingError::ErrorBudgetExhausted { .. }
                | TradingError::Cancelled
        )
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::Serialization(err.to_string())
    }
}

/// Errors returned by the remote market-data / trading API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Rate limited by remote (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Request rejected {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Rate-limit responses are retried with backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// Transient failures are retried with backoff; everything else is
    /// returned to the caller immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout(_) | ApiError::Network(_) | ApiError::Server { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.is_rate_limited() || self.is_transient()
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Live market feed errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Subscription rejected: {0}")]
    Subscription(String),

    #[error("Malformed message: {0}")]
    Protocol(String),
}

/// Reasons a single signal or position action is refused.
///
/// A violation rejects one action; it never stops the control loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskViolation {
    #[error("Maximum open positions reached ({0})")]
    MaxPositions(usize),

    #[error("Already holding {0}")]
    DuplicateInstrument(String),

    #[error("Stop/target on the wrong side of entry for {0}")]
    InvalidLevels(String),

    #[error("Reward/risk {actual:.2} below minimum {minimum:.2}")]
    RewardRisk { actual: f64, minimum: f64 },

    #[error("Position size is zero for {0}")]
    ZeroQuantity(String),

    #[error("Session limit: {0}")]
    Limit(String),

    #[error("New entries are closed for the session")]
    EntryWindowClosed,

    #[error("Signal for {symbol} is stale ({age_secs}s old)")]
    StaleSignal { symbol: String, age_secs: i64 },
}

/// Result type alias for trading operations.
pub type TradingResult<T> = Result<T, TradingError>;
