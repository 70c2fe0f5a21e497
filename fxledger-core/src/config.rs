//! Configuration management
//!
//! Settings live in `settings.json` inside the ledger directory:
//! ```json
//! {
//!   "currencies": ["USD", "EUR", "GBP"],
//!   "snapshotInterval": 50
//! }
//! ```
//! Keys this crate does not manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::Currency;

/// Default number of transactions between cadence snapshots
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 50;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    currencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snapshot_interval: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Currencies this deployment accepts, in declaration order
    pub currencies: Vec<Currency>,
    /// Write a cadence snapshot after every Nth transaction touching an account
    pub snapshot_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currencies: Currency::ALL.to_vec(),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

impl Config {
    /// Load config from the ledger directory
    ///
    /// Environment overrides (for CI/testing):
    /// - `FXLEDGER_SNAPSHOT_INTERVAL`: positive integer
    /// - `FXLEDGER_CURRENCIES`: comma-separated currency codes
    pub fn load(ledger_dir: &Path) -> Result<Self> {
        let raw = read_settings(ledger_dir)?;

        let currencies = match std::env::var("FXLEDGER_CURRENCIES").ok() {
            Some(list) => parse_currencies(list.split(','))?,
            None => match &raw.currencies {
                Some(codes) => parse_currencies(codes.iter().map(String::as_str))?,
                None => Currency::ALL.to_vec(),
            },
        };

        let snapshot_interval = match std::env::var("FXLEDGER_SNAPSHOT_INTERVAL").ok() {
            Some(value) => value.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("FXLEDGER_SNAPSHOT_INTERVAL must be a positive integer, got '{}'", value))
            })?,
            None => raw.snapshot_interval.unwrap_or(DEFAULT_SNAPSHOT_INTERVAL),
        };

        let config = Self {
            currencies,
            snapshot_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to the ledger directory, keeping unrelated keys
    pub fn save(&self, ledger_dir: &Path) -> Result<()> {
        self.validate()?;
        let mut settings = read_settings(ledger_dir)?;

        settings.currencies = Some(self.currencies.iter().map(|c| c.code().to_string()).collect());
        settings.snapshot_interval = Some(self.snapshot_interval);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(ledger_dir.join("settings.json"), content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.snapshot_interval == 0 {
            return Err(Error::Config("snapshotInterval must be at least 1".to_string()));
        }
        if self.currencies.is_empty() {
            return Err(Error::Config("at least one currency must be enabled".to_string()));
        }
        Ok(())
    }
}

fn read_settings(ledger_dir: &Path) -> Result<SettingsFile> {
    let settings_path = ledger_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid {}: {}", settings_path.display(), e)))
}

fn parse_currencies<'a>(codes: impl Iterator<Item = &'a str>) -> Result<Vec<Currency>> {
    let mut currencies = Vec::new();
    for code in codes.filter(|c| !c.trim().is_empty()) {
        let currency: Currency = code.parse()?;
        if !currencies.contains(&currency) {
            currencies.push(currency);
        }
    }
    Ok(currencies)
}
