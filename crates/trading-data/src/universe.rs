//! Named instrument baskets and their resolution into tradable instruments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trading_broker::RateLimitedClient;
use trading_core::error::{TradingError, TradingResult};
use trading_core::types::Instrument;

/// One catalog line: a symbol before its exchange token is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub symbol: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    pub sector: String,
}

fn default_exchange() -> String {
    "NSE".to_string()
}

impl UniverseEntry {
    pub fn new(symbol: &str, sector: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: default_exchange(),
            sector: sector.to_string(),
        }
    }
}

const NIFTY_BANK: &[(&str, &str)] = &[
    ("HDFCBANK", "PVT_BANK"),
    ("ICICIBANK", "PVT_BANK"),
    ("KOTAKBANK", "PVT_BANK"),
    ("AXISBANK", "PVT_BANK"),
    ("INDUSINDBK", "PVT_BANK"),
    ("FEDERALBNK", "PVT_BANK"),
    ("IDFCFIRSTB", "PVT_BANK"),
    ("AUBANK", "PVT_BANK"),
    ("BANDHANBNK", "PVT_BANK"),
    ("SBIN", "PSU_BANK"),
    ("BANKBARODA", "PSU_BANK"),
    ("PNB", "PSU_BANK"),
];

const NIFTY_IT: &[(&str, &str)] = &[
    ("TCS", "IT"),
    ("INFY", "IT"),
    ("HCLTECH", "IT"),
    ("WIPRO", "IT"),
    ("TECHM", "IT"),
    ("LTIM", "IT"),
    ("PERSISTENT", "IT"),
    ("COFORGE", "IT"),
    ("MPHASIS", "IT"),
    ("LTTS", "IT"),
];

const NIFTY_LEADERS: &[(&str, &str)] = &[
    ("RELIANCE", "ENERGY"),
    ("ONGC", "ENERGY"),
    ("NTPC", "ENERGY"),
    ("HDFCBANK", "PVT_BANK"),
    ("ICICIBANK", "PVT_BANK"),
    ("SBIN", "PSU_BANK"),
    ("INFY", "IT"),
    ("TCS", "IT"),
    ("TATAMOTORS", "AUTO"),
    ("MARUTI", "AUTO"),
    ("M&M", "AUTO"),
    ("SUNPHARMA", "PHARMA"),
    ("DRREDDY", "PHARMA"),
    ("HINDUNILVR", "FMCG"),
    ("ITC", "FMCG"),
    ("LT", "INFRA"),
    ("TATASTEEL", "METAL"),
    ("HINDALCO", "METAL"),
];

/// Built-in and configured universes, keyed by upper-case name.
#[derive(Debug, Clone, Default)]
pub struct UniverseCatalog {
    universes: BTreeMap<String, Vec<UniverseEntry>>,
}

impl UniverseCatalog {
    /// Catalog with the built-in baskets only.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for (name, members) in [
            ("NIFTY_BANK", NIFTY_BANK),
            ("NIFTY_IT", NIFTY_IT),
            ("NIFTY_LEADERS", NIFTY_LEADERS),
        ] {
            let entries = members
                .iter()
                .map(|(symbol, sector)| UniverseEntry::new(symbol, sector))
                .collect();
            catalog.insert(name, entries);
        }
        catalog
    }

    /// Add or replace a universe.
    pub fn insert(&mut self, name: &str, entries: Vec<UniverseEntry>) {
        self.universes.insert(name.to_ascii_uppercase(), entries);
    }

    /// Add configured universes on top of the current ones.
    pub fn with_custom(mut self, custom: &BTreeMap<String, Vec<UniverseEntry>>) -> Self {
        for (name, entries) in custom {
            self.insert(name, entries.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&[UniverseEntry]> {
        self.universes
            .get(&name.to_ascii_uppercase())
            .map(|v| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Universe names with their member counts.
    pub fn list(&self) -> Vec<(&str, usize)> {
        self.universes
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.len()))
            .collect()
    }
}

/// Resolves a universe name into instruments with exchange tokens.
pub struct UniverseResolver {
    catalog: UniverseCatalog,
    client: RateLimitedClient,
}

impl UniverseResolver {
    pub fn new(catalog: UniverseCatalog, client: RateLimitedClient) -> Self {
        Self { catalog, client }
    }

    pub fn catalog(&self) -> &UniverseCatalog {
        &self.catalog
    }

    /// Look up every member of `name`, in catalog order.
    ///
    /// Members whose lookup fails are skipped. Resolution aborts on
    /// cancellation and fails when nothing resolves.
    pub async fn resolve(&self, name: &str) -> TradingResult<Vec<Instrument>> {
        let entries = self
            .catalog
            .get(name)
            .ok_or_else(|| TradingError::UnknownUniverse(name.to_string()))?;

        let mut instruments = Vec::with_capacity(entries.len());
        for entry in entries {
            match self
                .client
                .lookup_instrument(&entry.exchange, &entry.symbol, &entry.sector)
                .await
            {
                Ok(instrument) => instruments.push(instrument),
                Err(TradingError::Cancelled) => return Err(TradingError::Cancelled),
                Err(e) => {
                    warn!(symbol = %entry.symbol, error = %e, "Skipping instrument, token lookup failed");
                }
            }
        }

        if instruments.is_empty() {
            return Err(TradingError::NoInstrumentsResolved {
                universe: name.to_string(),
                attempted: entries.len(),
            });
        }

        info!(
            universe = %name,
            resolved = instruments.len(),
            attempted = entries.len(),
            "Universe resolved"
        );
        Ok(instruments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use trading_broker::RateLimitConfig;
    use trading_core::error::ApiError;

    fn resolver(api: FakeApi, catalog: UniverseCatalog) -> UniverseResolver {
        let client = RateLimitedClient::new(Arc::new(api), FakeApi::fast_limits());
        UniverseResolver::new(catalog, client)
    }

    fn small_catalog() -> UniverseCatalog {
        let mut catalog = UniverseCatalog::default();
        catalog.insert(
            "mini",
            vec![
                UniverseEntry::new("SBIN", "PSU_BANK"),
                UniverseEntry::new("INFY", "IT"),
                UniverseEntry::new("TCS", "IT"),
            ],
        );
        catalog
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = UniverseCatalog::builtin();
        assert_eq!(catalog.get("nifty_bank").map(|e| e.len()), Some(12));
        assert!(catalog.contains("NIFTY_IT"));
        assert!(!catalog.contains("NASDAQ"));

        let mut custom = BTreeMap::new();
        custom.insert("watch".to_string(), vec![UniverseEntry::new("ITC", "FMCG")]);
        let catalog = catalog.with_custom(&custom);
        assert_eq!(catalog.list().len(), 4);
        assert_eq!(catalog.get("WATCH").unwrap()[0].exchange, "NSE");
    }

    #[tokio::test]
    async fn test_partial_failure_skipped() {
        let api = FakeApi::default().failing_lookup("INFY", ApiError::NotFound("INFY".into()));
        let instruments = resolver(api, small_catalog()).resolve("MINI").await.unwrap();

        let symbols: Vec<_> = instruments.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["SBIN", "TCS"]);
        assert_eq!(instruments[0].sector, "PSU_BANK");
        assert_eq!(instruments[0].token, "tok-SBIN");
    }

    #[tokio::test]
    async fn test_rate_limited_instrument_skipped() {
        let api = FakeApi::default()
            .failing_lookup("SBIN", ApiError::RateLimited { retry_after: None });
        let instruments = resolver(api, small_catalog()).resolve("mini").await.unwrap();
        assert_eq!(instruments.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_universe() {
        let err = resolver(FakeApi::default(), small_catalog())
            .resolve("nope")
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::UnknownUniverse(_)));

        let api = FakeApi::default()
            .failing_lookup("SBIN", ApiError::NotFound(String::new()))
            .failing_lookup("INFY", ApiError::NotFound(String::new()))
            .failing_lookup("TCS", ApiError::NotFound(String::new()));
        let err = resolver(api, small_catalog()).resolve("mini").await.unwrap_err();
        assert!(matches!(
            err,
            TradingError::NoInstrumentsResolved { attempted: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancellation_aborts() {
        let token = CancellationToken::new();
        token.cancel();
        let client = RateLimitedClient::new(
            Arc::new(FakeApi::default()),
            RateLimitConfig {
                lookup_interval_ms: 1000,
                ..FakeApi::fast_limits()
            },
        );
        // First lookup runs immediately; the second waits on pacing and sees the cancel
        let resolver = UniverseResolver::new(small_catalog(), client.with_cancellation(token));
        let err = resolver.resolve("mini").await.unwrap_err();
        assert!(matches!(err, TradingError::Cancelled));
    }
}
