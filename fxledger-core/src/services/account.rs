//! Account service - account creation and current balances

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::money;
use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, Balances, Currency};
use crate::ports::LedgerStore;

use super::ensure_enabled;

pub struct AccountService {
    store: Arc<dyn LedgerStore>,
    currencies: Vec<Currency>,
}

impl AccountService {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Vec<Currency>) -> Self {
        Self { store, currencies }
    }

    /// Open an account with the given initial balances
    ///
    /// Every enabled currency gets a balance; those not listed start at zero.
    /// Amounts are rounded to cents, must not be negative and must fit the
    /// stored amount range.
    pub fn create_account(&self, initial: &[(Currency, Decimal)]) -> Result<Account> {
        let mut balances = Balances::zero(&self.currencies);
        let mut seen = Vec::with_capacity(initial.len());
        for &(currency, amount) in initial {
            ensure_enabled(&self.currencies, currency)?;
            if seen.contains(&currency) {
                return Err(Error::validation(format!(
                    "initial balance for {} given more than once",
                    currency
                )));
            }
            seen.push(currency);

            let amount = money::round(amount);
            if amount < Decimal::ZERO || !money::in_range(amount) {
                return Err(Error::InvalidAmount(amount));
            }
            balances = balances.with_balance(currency, amount);
        }

        let mut tx = self.store.begin()?;
        let created_at = tx.now();
        let id = tx.create_account(&balances, created_at)?;
        tx.commit()?;

        tracing::info!(account = id, "account created");
        Ok(Account {
            id,
            opening_balances: balances.clone(),
            balances,
            created_at,
        })
    }

    pub fn get_account(&self, id: AccountId) -> Result<Account> {
        let tx = self.store.begin()?;
        tx.get_account(id)?.ok_or_else(|| Error::invalid_account(id))
    }

    /// Current balances of an account
    pub fn get_balance(&self, id: AccountId) -> Result<Balances> {
        Ok(self.get_account(id)?.balances)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let tx = self.store.begin()?;
        tx.list_accounts()
    }
}
