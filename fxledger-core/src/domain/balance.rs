//! Balances and balance snapshot domain models

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::currency::Currency;
use super::result::Error;

/// Per-currency balances of one account.
///
/// A currency with no entry holds zero, and equality treats it that way, so
/// `{USD: 0}` equals `{}`. Every operation returns a new value; nothing is
/// mutated in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<Currency, Decimal>);

impl Balances {
    /// All `currencies` at zero
    pub fn zero(currencies: &[Currency]) -> Self {
        Self(currencies.iter().map(|c| (*c, Decimal::ZERO)).collect())
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Currency, Decimal)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Balance held in `currency` (zero when absent)
    pub fn get(&self, currency: Currency) -> Decimal {
        self.0.get(&currency).copied().unwrap_or(Decimal::ZERO)
    }

    /// Copy with `delta` added to `currency`
    #[must_use]
    pub fn with_delta(&self, currency: Currency, delta: Decimal) -> Self {
        let mut next = self.0.clone();
        *next.entry(currency).or_insert(Decimal::ZERO) += delta;
        Self(next)
    }

    /// Copy with `currency` set to `amount`
    #[must_use]
    pub fn with_balance(&self, currency: Currency, amount: Decimal) -> Self {
        let mut next = self.0.clone();
        next.insert(currency, amount);
        Self(next)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Currency, Decimal)> + '_ {
        self.0.iter().map(|(c, d)| (*c, *d))
    }

    /// First currency whose balance is below zero, if any
    pub fn first_negative(&self) -> Option<Currency> {
        self.0
            .iter()
            .find(|(_, amount)| amount.is_sign_negative() && !amount.is_zero())
            .map(|(c, _)| *c)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|d| d.is_zero())
    }
}

impl PartialEq for Balances {
    fn eq(&self, other: &Self) -> bool {
        self.0
            .keys()
            .chain(other.0.keys())
            .all(|c| self.get(*c) == other.get(*c))
    }
}

impl Eq for Balances {}

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Written by the snapshot cadence policy
    Cadence,
    /// Written on request
    Manual,
    /// Not persisted: the opening balances at account creation
    Opening,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Cadence => "cadence",
            SnapshotSource::Manual => "manual",
            SnapshotSource::Opening => "opening",
        }
    }
}

impl FromStr for SnapshotSource {
    type Err = Error;

    /// Accepts the stored name; anything else means the row is corrupt
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cadence" => Ok(SnapshotSource::Cadence),
            "manual" => Ok(SnapshotSource::Manual),
            "opening" => Ok(SnapshotSource::Opening),
            other => Err(Error::storage(format!("unknown snapshot source '{}'", other))),
        }
    }
}

/// Balances of an account as of `timestamp`, with every transaction up to and
/// including that instant applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// `None` for the synthetic opening snapshot
    pub id: Option<i64>,
    pub account_id: AccountId,
    pub timestamp: DateTime<Utc>,
    pub balances: Balances,
    pub source: SnapshotSource,
}

impl Snapshot {
    /// Synthetic snapshot standing for an account's opening balances
    pub fn opening(account_id: AccountId, created_at: DateTime<Utc>, balances: Balances) -> Self {
        Self {
            id: None,
            account_id,
            timestamp: created_at,
            balances,
            source: SnapshotSource::Opening,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.id.is_none()
    }
}
