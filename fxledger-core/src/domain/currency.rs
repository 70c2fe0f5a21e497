//! Currency domain model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::result::Error;

/// A currency the ledger can hold balances in.
///
/// The set is fixed at build time; a deployment may enable a subset of it through
/// `Config::currencies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    /// Every supported currency, in display order
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Gbp];

    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            _ => Err(Error::InvalidCurrency(s.trim().to_string())),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!(" Eur ".parse::<Currency>().unwrap(), Currency::Eur);
        assert_eq!("GBP".parse::<Currency>().unwrap(), Currency::Gbp);
    }

    #[test]
    fn test_unknown_code_is_invalid_currency() {
        let err = "JPY".parse::<Currency>().unwrap_err();
        assert!(matches!(err, Error::InvalidCurrency(ref code) if code == "JPY"));
    }

    #[test]
    fn test_serializes_as_code() {
        assert_eq!(serde_json::to_string(&Currency::Gbp).unwrap(), "\"GBP\"");
        let parsed: Currency = serde_json::from_str("\"EUR\"").unwrap();
        assert_eq!(parsed, Currency::Eur);
    }
}
