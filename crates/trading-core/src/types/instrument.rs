//! Instruments, session mode and API operation classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A resolved, tradable instrument. Immutable for the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Trading symbol, e.g. "INFY"
    pub symbol: String,
    /// Exchange segment, e.g. "NSE"
    pub exchange: String,
    /// Exchange token used by the feed and order APIs
    pub token: String,
    /// Sector / classification
    pub sector: String,
}

impl Instrument {
    pub fn new(
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        token: impl Into<String>,
        sector: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            token: token.into(),
            sector: sector.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

/// Whether the session risks real capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Real orders against the broker
    Live,
    /// Simulated fills; may run without a live feed
    #[default]
    Paper,
}

impl TradingMode {
    /// Capital-risking sessions treat a missing feed as fatal.
    pub fn risks_capital(&self) -> bool {
        matches!(self, TradingMode::Live)
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(TradingMode::Live),
            "paper" | "simulation" | "sim" => Ok(TradingMode::Paper),
            _ => Err(format!("Invalid trading mode: {}", s)),
        }
    }
}

/// Rate-limit class of a market API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Symbol / token lookup
    Lookup,
    /// Historical candle fetch
    History,
    /// Quote snapshot
    Quote,
    /// Order placement
    Order,
    /// Broker health / session check
    Health,
}

impl OperationClass {
    pub fn all() -> &'static [OperationClass] {
        &[
            OperationClass::Lookup,
            OperationClass::History,
            OperationClass::Quote,
            OperationClass::Order,
            OperationClass::Health,
        ]
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationClass::Lookup => "lookup",
            OperationClass::History => "history",
            OperationClass::Quote => "quote",
            OperationClass::Order => "order",
            OperationClass::Health => "health",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_mode_parse() {
        assert_eq!(TradingMode::from_str("LIVE").unwrap(), TradingMode::Live);
        assert_eq!(TradingMode::from_str("sim").unwrap(), TradingMode::Paper);
        assert!(TradingMode::from_str("demo").is_err());
        assert!(TradingMode::Live.risks_capital());
        assert!(!TradingMode::Paper.risks_capital());
    }

    #[test]
    fn test_instrument_display() {
        let inst = Instrument::new("INFY", "NSE", "1594", "IT");
        assert_eq!(inst.to_string(), "NSE:INFY");
    }
}
