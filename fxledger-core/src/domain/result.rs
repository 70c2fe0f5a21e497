//! Result and error types for the core library

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::account::{AccountId, AccountRole};
use super::currency::Currency;

/// Core library error type
///
/// Domain conditions (unknown account, insufficient balance, ...) are ordinary
/// values of this type. Each variant maps to a stable code via [`Error::code`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid {role} ID: {id}")]
    InvalidAccount { role: AccountRole, id: AccountId },

    #[error("Invalid currency '{0}'")]
    InvalidCurrency(String),

    #[error("Amount must be positive and at most {max}, got {0}", max = super::money::MAX_AMOUNT)]
    InvalidAmount(Decimal),

    #[error("{0} is outside the storable amount range")]
    AmountOutOfRange(String),

    #[error("Exchange rate must be positive and at most {max}, got {0}", max = super::money::MAX_AMOUNT)]
    InvalidRate(Decimal),

    #[error("Insufficient balance in {currency} on account {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        currency: Currency,
        available: Decimal,
        requested: Decimal,
    },

    #[error("No exchange rate available between {from} and {to}")]
    NoExchangeRate { from: Currency, to: Currency },

    #[error("No recorded history for account {account} at {at}")]
    NoHistory { account: AccountId, at: DateTime<Utc> },

    #[error("Cannot transfer from account {0} to itself")]
    SelfTransfer(AccountId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a storage failure
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an out-of-range error describing the computation that overflowed
    pub fn out_of_range(what: impl Into<String>) -> Self {
        Self::AmountOutOfRange(what.into())
    }

    pub fn invalid_account(id: AccountId) -> Self {
        Self::InvalidAccount { role: AccountRole::Account, id }
    }

    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidAccount { .. } => "invalid_account",
            Error::InvalidCurrency(_) => "invalid_currency",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::AmountOutOfRange(_) => "amount_out_of_range",
            Error::InvalidRate(_) => "invalid_rate",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::NoExchangeRate { .. } => "no_exchange_rate",
            Error::NoHistory { .. } => "no_history",
            Error::SelfTransfer(_) => "self_transfer",
            Error::Validation(_) => "validation",
            Error::StorageFailure(_) => "storage_failure",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Stable error code, see [`Error::code`]
    pub code: Option<String>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            code: Some(error.code().to_string()),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(&e),
        }
    }
}
