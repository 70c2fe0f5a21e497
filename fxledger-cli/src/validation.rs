//! Argument parsing and validation for CLI input

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;

use fxledger_core::domain::money;
use fxledger_core::{Currency, Error, Result};

/// Opening balances given as `CUR=AMT,CUR=AMT`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceList(pub Vec<(Currency, Decimal)>);

/// Parse `USD=100,EUR=50.5`; an empty string means no opening balances
///
/// Amounts may be zero but never negative or beyond the stored amount range.
pub fn parse_balances(s: &str) -> Result<BalanceList> {
    let mut pairs = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (code, amount) = part
            .split_once('=')
            .ok_or_else(|| Error::validation(format!("expected CUR=AMT, got '{}'", part)))?;
        let currency = Currency::from_str(code)?;
        let amount = money::round(parse_decimal(amount)?);
        if amount < Decimal::ZERO || !money::in_range(amount) {
            return Err(Error::InvalidAmount(amount));
        }
        if pairs.iter().any(|(c, _)| *c == currency) {
            return Err(Error::validation(format!("{} listed more than once", currency)));
        }
        pairs.push((currency, amount));
    }
    Ok(BalanceList(pairs))
}

/// Positive amount within the stored range, rounded to cents
pub fn parse_amount(s: &str) -> Result<Decimal> {
    let amount = money::round(parse_decimal(s)?);
    if amount <= Decimal::ZERO || !money::in_range(amount) {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(amount)
}

/// Positive exchange rate, rounded to two places
pub fn parse_rate(s: &str) -> Result<Decimal> {
    let rate = money::round(parse_decimal(s)?);
    if rate <= Decimal::ZERO || !money::in_range(rate) {
        return Err(Error::InvalidRate(rate));
    }
    Ok(rate)
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS[.ffffff]` (UTC) or `YYYY-MM-DD` (midnight UTC)
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::validation(format!("unrecognized timestamp '{}'", s)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s.trim()).map_err(|_| Error::validation(format!("'{}' is not a number", s.trim())))
}
