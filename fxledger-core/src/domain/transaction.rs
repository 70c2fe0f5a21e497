//! Transaction log entry domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::currency::Currency;
use super::money;
use super::result::Error;

pub type TransactionId = i64;

/// Kind of balance change recorded by a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    DepositMade,
    WithdrawalMade,
    MoneyTransferred,
    CurrencyConverted,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::DepositMade => "DepositMade",
            TransactionKind::WithdrawalMade => "WithdrawalMade",
            TransactionKind::MoneyTransferred => "MoneyTransferred",
            TransactionKind::CurrencyConverted => "CurrencyConverted",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    /// Accepts the stored name (`DepositMade`) or a short CLI alias (`deposit`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "depositmade" | "deposit" => Ok(TransactionKind::DepositMade),
            "withdrawalmade" | "withdrawal" | "withdraw" => Ok(TransactionKind::WithdrawalMade),
            "moneytransferred" | "transfer" => Ok(TransactionKind::MoneyTransferred),
            "currencyconverted" | "conversion" | "convert" => Ok(TransactionKind::CurrencyConverted),
            other => Err(Error::validation(format!("unknown transaction type: {}", other))),
        }
    }
}

/// A log entry before the store has assigned its id and commit timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub amount: Decimal,
    pub rate: Decimal,
}

impl NewTransaction {
    pub fn deposit(account: AccountId, currency: Currency, amount: Decimal) -> Self {
        Self {
            kind: TransactionKind::DepositMade,
            from_account: account,
            to_account: account,
            from_currency: currency,
            to_currency: currency,
            amount,
            rate: Decimal::ONE,
        }
    }

    pub fn withdrawal(account: AccountId, currency: Currency, amount: Decimal) -> Self {
        Self {
            kind: TransactionKind::WithdrawalMade,
            ..Self::deposit(account, currency, amount)
        }
    }

    pub fn transfer(
        from: AccountId,
        to: AccountId,
        from_currency: Currency,
        to_currency: Currency,
        amount: Decimal,
        rate: Decimal,
    ) -> Self {
        Self {
            kind: TransactionKind::MoneyTransferred,
            from_account: from,
            to_account: to,
            from_currency,
            to_currency,
            amount,
            rate,
        }
    }

    pub fn conversion(
        account: AccountId,
        from_currency: Currency,
        to_currency: Currency,
        amount: Decimal,
        rate: Decimal,
    ) -> Self {
        Self {
            kind: TransactionKind::CurrencyConverted,
            from_account: account,
            to_account: account,
            from_currency,
            to_currency,
            amount,
            rate,
        }
    }
}

/// Immutable entry of the append-only transaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub from_account: AccountId,
    pub to_account: AccountId,
    /// Commit time assigned by the store
    pub timestamp: DateTime<Utc>,
    pub from_currency: Currency,
    pub to_currency: Currency,
    /// Always positive, in `from_currency`
    pub amount: Decimal,
    /// Rate applied at commit time, `1` when no conversion happened
    pub rate: Decimal,
}

impl Transaction {
    pub fn from_new(id: TransactionId, timestamp: DateTime<Utc>, entry: &NewTransaction) -> Self {
        Self {
            id,
            kind: entry.kind,
            from_account: entry.from_account,
            to_account: entry.to_account,
            timestamp,
            from_currency: entry.from_currency,
            to_currency: entry.to_currency,
            amount: entry.amount,
            rate: entry.rate,
        }
    }

    pub fn touches(&self, account: AccountId) -> bool {
        self.from_account == account || self.to_account == account
    }

    pub fn is_conversion(&self) -> bool {
        self.from_currency != self.to_currency
    }

    /// Amount that landed in `to_currency`, computed with the stored rate
    pub fn credited_amount(&self) -> Decimal {
        if self.is_conversion() {
            money::convert(self.amount, self.rate)
        } else {
            self.amount
        }
    }
}
