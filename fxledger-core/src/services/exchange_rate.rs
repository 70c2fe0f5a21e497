//! Exchange rate registry - versioned, bidirectional conversion rates

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::money;
use crate::domain::result::{Error, Result};
use crate::domain::{Currency, ExchangeRate};
use crate::ports::{LedgerStore, StoreTransaction};

use super::ensure_enabled;

/// Start rates written by `seed_default_rates`
pub const DEFAULT_RATES: [(Currency, Currency, Decimal); 3] = [
    (Currency::Usd, Currency::Eur, Decimal::from_parts(15, 0, 0, false, 1)),
    (Currency::Usd, Currency::Gbp, Decimal::from_parts(2, 0, 0, false, 0)),
    (Currency::Eur, Currency::Gbp, Decimal::from_parts(3, 0, 0, false, 0)),
];

/// Both rows written by one rate update
#[derive(Debug, Clone, Serialize)]
pub struct RateUpdate {
    pub forward: ExchangeRate,
    pub reverse: ExchangeRate,
}

pub struct ExchangeRateService {
    store: Arc<dyn LedgerStore>,
    currencies: Vec<Currency>,
}

impl ExchangeRateService {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Vec<Currency>) -> Self {
        Self { store, currencies }
    }

    /// Record `from -> to` at `rate` and `to -> from` at its rounded reciprocal
    ///
    /// Both rows share one timestamp and commit together. Returns `None` when
    /// `from == to`, which records nothing.
    pub fn update_rate(&self, from: Currency, to: Currency, rate: Decimal) -> Result<Option<RateUpdate>> {
        ensure_enabled(&self.currencies, from)?;
        ensure_enabled(&self.currencies, to)?;
        let rate = money::round(rate);
        let reverse_rate = validate_rate(rate)?;

        if from == to {
            return Ok(None);
        }

        let mut tx = self.store.begin()?;
        let update = write_pair(tx.as_mut(), from, to, rate, reverse_rate)?;
        tx.commit()?;

        tracing::info!(%from, %to, rate = %rate, reverse = %reverse_rate, "exchange rate updated");
        Ok(Some(update))
    }

    /// Current rate for a pair: the most recently inserted row
    pub fn get_latest_rate(&self, from: Currency, to: Currency) -> Result<ExchangeRate> {
        ensure_enabled(&self.currencies, from)?;
        ensure_enabled(&self.currencies, to)?;
        let tx = self.store.begin()?;
        latest_rate(tx.as_ref(), from, to)
    }

    /// Rate in force at `timestamp`: the latest row at or before it
    pub fn get_rate_at(&self, from: Currency, to: Currency, timestamp: DateTime<Utc>) -> Result<ExchangeRate> {
        ensure_enabled(&self.currencies, from)?;
        ensure_enabled(&self.currencies, to)?;
        let tx = self.store.begin()?;
        rate_at(tx.as_ref(), from, to, timestamp)
    }

    /// Current rate of every enabled pair that has one
    pub fn list_latest_rates(&self) -> Result<Vec<ExchangeRate>> {
        let tx = self.store.begin()?;
        let mut rates = Vec::new();
        for &from in &self.currencies {
            for &to in &self.currencies {
                if from == to {
                    continue;
                }
                if let Some(rate) = tx.latest_rate(from, to)? {
                    rates.push(rate);
                }
            }
        }
        Ok(rates)
    }

    /// Every row recorded for `from -> to`, oldest first
    pub fn rate_history(&self, from: Currency, to: Currency) -> Result<Vec<ExchangeRate>> {
        ensure_enabled(&self.currencies, from)?;
        ensure_enabled(&self.currencies, to)?;
        let tx = self.store.begin()?;
        Ok(tx
            .all_rates()?
            .into_iter()
            .filter(|r| r.from_currency == from && r.to_currency == to)
            .collect())
    }

    /// Write the start rates (USD->EUR 1.5, USD->GBP 2, EUR->GBP 3)
    ///
    /// Pairs involving a disabled currency are skipped. All pairs commit together.
    pub fn seed_default_rates(&self) -> Result<Vec<RateUpdate>> {
        let mut tx = self.store.begin()?;
        let mut updates = Vec::new();
        for (from, to, rate) in DEFAULT_RATES {
            if !self.currencies.contains(&from) || !self.currencies.contains(&to) {
                continue;
            }
            let reverse = validate_rate(rate)?;
            updates.push(write_pair(tx.as_mut(), from, to, rate, reverse)?);
        }
        tx.commit()?;

        tracing::info!(pairs = updates.len(), "seeded default exchange rates");
        Ok(updates)
    }
}

/// Check a rounded forward rate and return its rounded reciprocal
fn validate_rate(rate: Decimal) -> Result<Decimal> {
    if rate <= Decimal::ZERO || !money::in_range(rate) {
        return Err(Error::InvalidRate(rate));
    }
    match money::reciprocal(rate) {
        Some(reverse) if reverse > Decimal::ZERO => Ok(reverse),
        _ => Err(Error::InvalidRate(rate)),
    }
}

fn write_pair(
    tx: &mut dyn StoreTransaction,
    from: Currency,
    to: Currency,
    rate: Decimal,
    reverse_rate: Decimal,
) -> Result<RateUpdate> {
    let timestamp = tx.now();
    let forward = tx.insert_rate(from, to, rate, timestamp)?;
    let reverse = tx.insert_rate(to, from, reverse_rate, timestamp)?;
    Ok(RateUpdate { forward, reverse })
}

/// Latest rate inside an open unit of work
pub(crate) fn latest_rate(tx: &dyn StoreTransaction, from: Currency, to: Currency) -> Result<ExchangeRate> {
    tx.latest_rate(from, to)?
        .ok_or(Error::NoExchangeRate { from, to })
}

/// Rate at `timestamp` inside an open unit of work
pub(crate) fn rate_at(
    tx: &dyn StoreTransaction,
    from: Currency,
    to: Currency,
    timestamp: DateTime<Utc>,
) -> Result<ExchangeRate> {
    tx.rate_at_or_before(from, to, timestamp)?
        .ok_or(Error::NoExchangeRate { from, to })
}
