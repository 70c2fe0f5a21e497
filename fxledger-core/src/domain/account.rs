//! Account domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::balance::{Balances, Snapshot};
use super::currency::Currency;

pub type AccountId = i64;

/// A ledger account holding one balance per enabled currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Current balances
    pub balances: Balances,
    /// Balances supplied when the account was created
    pub opening_balances: Balances,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn balance(&self, currency: Currency) -> Decimal {
        self.balances.get(currency)
    }

    /// Replay base used when no persisted snapshot precedes a query
    pub fn opening_snapshot(&self) -> Snapshot {
        Snapshot::opening(self.id, self.created_at, self.opening_balances.clone())
    }
}

/// Which side of a transfer an account id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Account,
    Sender,
    Receiver,
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AccountRole::Account => "account",
            AccountRole::Sender => "sender account",
            AccountRole::Receiver => "receiver account",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_snapshot_is_synthetic() {
        let opening = Balances::zero(&Currency::ALL).with_delta(Currency::Usd, Decimal::new(100, 0));
        let account = Account {
            id: 7,
            balances: opening.with_delta(Currency::Usd, Decimal::new(5, 0)),
            opening_balances: opening.clone(),
            created_at: Utc::now(),
        };

        let snapshot = account.opening_snapshot();
        assert!(snapshot.is_synthetic());
        assert_eq!(snapshot.account_id, 7);
        assert_eq!(snapshot.timestamp, account.created_at);
        assert_eq!(snapshot.balances, opening);
    }
}
