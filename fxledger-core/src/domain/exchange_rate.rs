//! Exchange rate domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::currency::Currency;

/// One direction of a conversion rate, valid from `timestamp` until superseded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate: Decimal,
}
