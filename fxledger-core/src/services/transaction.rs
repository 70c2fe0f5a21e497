//! Transaction engine - deposit, withdraw, transfer and convert
//!
//! The engine is the only writer of balances and log entries. Each operation
//! validates its arguments, takes the locks of the accounts it touches, then
//! runs balance updates, the log append and the snapshot check in a single
//! unit of work. Any failure drops the unit of work, leaving no trace.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::money;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountId, AccountRole, Currency, NewTransaction, Transaction, TransactionKind,
};
use crate::ports::{LedgerStore, StoreTransaction};

use super::ensure_enabled;
use super::exchange_rate::latest_rate;
use super::locks::AccountLocks;
use super::snapshot::{maybe_snapshot_in, SnapshotPolicy};

/// Default number of entries returned by `history`
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

pub struct TransactionService {
    store: Arc<dyn LedgerStore>,
    locks: Arc<AccountLocks>,
    policy: SnapshotPolicy,
    currencies: Vec<Currency>,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<AccountLocks>,
        policy: SnapshotPolicy,
        currencies: Vec<Currency>,
    ) -> Self {
        Self {
            store,
            locks,
            policy,
            currencies,
        }
    }

    /// Credit `amount` of `currency` to `account`
    pub fn deposit(&self, account: AccountId, currency: Currency, amount: Decimal) -> Result<Transaction> {
        reported("deposit", self.try_deposit(account, currency, amount))
    }

    fn try_deposit(&self, account: AccountId, currency: Currency, amount: Decimal) -> Result<Transaction> {
        let amount = validate_amount(amount)?;
        ensure_enabled(&self.currencies, currency)?;

        let _guard = self.locks.acquire(&[account])?;
        let mut tx = self.store.begin()?;
        require_account(tx.as_ref(), account, AccountRole::Account)?;

        tx.adjust_balance(account, currency, amount)?;
        let entry = tx.append_transaction(&NewTransaction::deposit(account, currency, amount))?;
        maybe_snapshot_in(tx.as_mut(), self.policy, account)?;
        tx.commit()?;

        tracing::info!(id = entry.id, account, %currency, "deposit committed");
        Ok(entry)
    }

    /// Debit `amount` of `currency` from `account`
    pub fn withdraw(&self, account: AccountId, currency: Currency, amount: Decimal) -> Result<Transaction> {
        reported("withdraw", self.try_withdraw(account, currency, amount))
    }

    fn try_withdraw(&self, account: AccountId, currency: Currency, amount: Decimal) -> Result<Transaction> {
        let amount = validate_amount(amount)?;
        ensure_enabled(&self.currencies, currency)?;

        let _guard = self.locks.acquire(&[account])?;
        let mut tx = self.store.begin()?;
        let record = require_account(tx.as_ref(), account, AccountRole::Account)?;
        ensure_funds(&record, currency, amount)?;

        tx.adjust_balance(account, currency, -amount)?;
        let entry = tx.append_transaction(&NewTransaction::withdrawal(account, currency, amount))?;
        maybe_snapshot_in(tx.as_mut(), self.policy, account)?;
        tx.commit()?;

        tracing::info!(id = entry.id, account, %currency, "withdrawal committed");
        Ok(entry)
    }

    /// Move `amount` of `from_currency` from one account to another
    ///
    /// With a different `to_currency` the receiver is credited the amount
    /// converted at the latest rate.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        from_currency: Currency,
        to_currency: Option<Currency>,
        amount: Decimal,
    ) -> Result<Transaction> {
        reported("transfer", self.try_transfer(from, to, from_currency, to_currency, amount))
    }

    fn try_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        from_currency: Currency,
        to_currency: Option<Currency>,
        amount: Decimal,
    ) -> Result<Transaction> {
        let amount = validate_amount(amount)?;
        let to_currency = to_currency.unwrap_or(from_currency);
        ensure_enabled(&self.currencies, from_currency)?;
        ensure_enabled(&self.currencies, to_currency)?;
        if from == to {
            return Err(Error::SelfTransfer(from));
        }

        let _guard = self.locks.acquire(&[from, to])?;
        let mut tx = self.store.begin()?;
        let sender = require_account(tx.as_ref(), from, AccountRole::Sender)?;
        require_account(tx.as_ref(), to, AccountRole::Receiver)?;
        ensure_funds(&sender, from_currency, amount)?;
        let (rate, credited) = conversion(tx.as_ref(), from_currency, to_currency, amount)?;

        tx.adjust_balance(from, from_currency, -amount)?;
        tx.adjust_balance(to, to_currency, credited)?;
        let entry = tx.append_transaction(&NewTransaction::transfer(
            from,
            to,
            from_currency,
            to_currency,
            amount,
            rate,
        ))?;
        maybe_snapshot_in(tx.as_mut(), self.policy, from)?;
        maybe_snapshot_in(tx.as_mut(), self.policy, to)?;
        tx.commit()?;

        tracing::info!(id = entry.id, from, to, %from_currency, %to_currency, "transfer committed");
        Ok(entry)
    }

    /// Exchange `amount` of `from_currency` into `to_currency` on one account
    pub fn convert(
        &self,
        account: AccountId,
        from_currency: Currency,
        to_currency: Currency,
        amount: Decimal,
    ) -> Result<Transaction> {
        reported("convert", self.try_convert(account, from_currency, to_currency, amount))
    }

    fn try_convert(
        &self,
        account: AccountId,
        from_currency: Currency,
        to_currency: Currency,
        amount: Decimal,
    ) -> Result<Transaction> {
        let amount = validate_amount(amount)?;
        ensure_enabled(&self.currencies, from_currency)?;
        ensure_enabled(&self.currencies, to_currency)?;

        let _guard = self.locks.acquire(&[account])?;
        let mut tx = self.store.begin()?;
        let record = require_account(tx.as_ref(), account, AccountRole::Account)?;
        ensure_funds(&record, from_currency, amount)?;
        let (rate, credited) = conversion(tx.as_ref(), from_currency, to_currency, amount)?;

        tx.adjust_balance(account, from_currency, -amount)?;
        tx.adjust_balance(account, to_currency, credited)?;
        let entry = tx.append_transaction(&NewTransaction::conversion(
            account,
            from_currency,
            to_currency,
            amount,
            rate,
        ))?;
        maybe_snapshot_in(tx.as_mut(), self.policy, account)?;
        tx.commit()?;

        tracing::info!(id = entry.id, account, %from_currency, %to_currency, "conversion committed");
        Ok(entry)
    }

    /// Most recent entries touching `account`, newest first
    pub fn history(
        &self,
        account: AccountId,
        limit: usize,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<Transaction>> {
        let tx = self.store.begin()?;
        require_account(tx.as_ref(), account, AccountRole::Account)?;
        tx.recent_transactions(account, limit, kind)
    }
}

/// Round a caller amount and require it to be positive and storable
fn validate_amount(amount: Decimal) -> Result<Decimal> {
    let amount = money::round(amount);
    if amount <= Decimal::ZERO || !money::in_range(amount) {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(amount)
}

fn require_account(tx: &dyn StoreTransaction, id: AccountId, role: AccountRole) -> Result<Account> {
    tx.get_account(id)?
        .ok_or(Error::InvalidAccount { role, id })
}

fn ensure_funds(account: &Account, currency: Currency, amount: Decimal) -> Result<()> {
    let available = account.balance(currency);
    if available < amount {
        return Err(Error::InsufficientBalance {
            account: account.id,
            currency,
            available,
            requested: amount,
        });
    }
    Ok(())
}

/// Rate and credited amount for moving `amount` between two currencies
fn conversion(
    tx: &dyn StoreTransaction,
    from: Currency,
    to: Currency,
    amount: Decimal,
) -> Result<(Decimal, Decimal)> {
    if from == to {
        return Ok((Decimal::ONE, amount));
    }
    let rate = latest_rate(tx, from, to)?.rate;
    let credited = money::checked_convert(amount, rate).ok_or_else(|| {
        Error::out_of_range(format!("{} {} converted to {} at {}", amount, from, to, rate))
    })?;
    Ok((rate, credited))
}

fn reported<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::warn!(operation, code = e.code(), "operation rejected: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::Balances;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: TransactionService,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let engine = TransactionService::new(
                store.clone(),
                Arc::new(AccountLocks::new()),
                SnapshotPolicy::default(),
                Currency::ALL.to_vec(),
            );
            Self { store, engine }
        }

        fn account(&self, usd: &str) -> AccountId {
            let mut tx = self.store.begin().unwrap();
            let now = tx.now();
            let balances = Balances::zero(&Currency::ALL).with_balance(Currency::Usd, dec(usd));
            let id = tx.create_account(&balances, now).unwrap();
            tx.commit().unwrap();
            id
        }

        fn balance(&self, id: AccountId, currency: Currency) -> Decimal {
            let tx = self.store.begin().unwrap();
            tx.get_account(id).unwrap().unwrap().balance(currency)
        }

        fn log_len(&self) -> u64 {
            self.store.begin().unwrap().total_transactions().unwrap()
        }

        fn rate(&self, from: Currency, to: Currency, rate: &str) {
            let mut tx = self.store.begin().unwrap();
            let now = tx.now();
            tx.insert_rate(from, to, dec(rate), now).unwrap();
            tx.commit().unwrap();
        }
    }

    #[test]
    fn test_deposit_adds_exactly_the_amount() {
        let f = Fixture::new();
        let id = f.account("100");

        let entry = f.engine.deposit(id, Currency::Gbp, dec("50")).unwrap();
        assert_eq!(entry.kind, TransactionKind::DepositMade);
        assert_eq!(entry.rate, Decimal::ONE);
        assert_eq!(f.balance(id, Currency::Gbp), dec("50"));
        assert_eq!(f.log_len(), 1);
    }

    #[test]
    fn test_amount_is_rounded_before_validation() {
        let f = Fixture::new();
        let id = f.account("0");

        assert!(matches!(
            f.engine.deposit(id, Currency::Usd, dec("0.004")),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            f.engine.deposit(id, Currency::Usd, dec("-5")),
            Err(Error::InvalidAmount(_))
        ));

        let entry = f.engine.deposit(id, Currency::Usd, dec("100.005")).unwrap();
        assert_eq!(entry.amount, dec("100.01"));
        assert_eq!(f.balance(id, Currency::Usd), dec("100.01"));
    }

    #[test]
    fn test_amount_above_storable_range_is_invalid() {
        let f = Fixture::new();
        let id = f.account("1");

        let err = f.engine.deposit(id, Currency::Usd, Decimal::MAX).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
        let err = f
            .engine
            .deposit(id, Currency::Usd, money::MAX_AMOUNT + dec("0.01"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
        assert!(matches!(
            f.engine.withdraw(id, Currency::Usd, Decimal::MAX),
            Err(Error::InvalidAmount(_))
        ));
        assert_eq!(f.balance(id, Currency::Usd), dec("1"));
        assert_eq!(f.log_len(), 0);
    }

    #[test]
    fn test_deposit_overflowing_balance_changes_nothing() {
        let f = Fixture::new();
        let id = f.account("1");

        let err = f.engine.deposit(id, Currency::Usd, money::MAX_AMOUNT).unwrap_err();
        assert!(matches!(err, Error::AmountOutOfRange(_)));
        assert_eq!(err.code(), "amount_out_of_range");
        assert_eq!(f.balance(id, Currency::Usd), dec("1"));
        assert_eq!(f.log_len(), 0);

        // the store is still usable afterwards
        f.engine.deposit(id, Currency::Usd, dec("2")).unwrap();
        assert_eq!(f.balance(id, Currency::Usd), dec("3"));
        assert_eq!(f.log_len(), 1);
    }

    #[test]
    fn test_conversion_overflowing_credit_changes_nothing() {
        let f = Fixture::new();
        let id = f.account("9000000000000000");
        f.rate(Currency::Usd, Currency::Eur, "2");

        let err = f
            .engine
            .convert(id, Currency::Usd, Currency::Eur, dec("6000000000000000"))
            .unwrap_err();
        assert!(matches!(err, Error::AmountOutOfRange(_)));
        assert_eq!(f.balance(id, Currency::Usd), dec("9000000000000000"));
        assert_eq!(f.balance(id, Currency::Eur), Decimal::ZERO);
        assert_eq!(f.log_len(), 0);

        let b = f.account("0");
        assert!(matches!(
            f.engine.transfer(id, b, Currency::Usd, Some(Currency::Eur), dec("6000000000000000")),
            Err(Error::AmountOutOfRange(_))
        ));
        assert_eq!(f.balance(b, Currency::Eur), Decimal::ZERO);
    }

    #[test]
    fn test_withdraw_over_balance_changes_nothing() {
        let f = Fixture::new();
        let id = f.account("10");

        let err = f.engine.withdraw(id, Currency::Usd, dec("10.01")).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { available, requested, .. }
            if available == dec("10") && requested == dec("10.01")));
        assert_eq!(f.balance(id, Currency::Usd), dec("10"));
        assert_eq!(f.log_len(), 0);

        f.engine.withdraw(id, Currency::Usd, dec("10")).unwrap();
        assert_eq!(f.balance(id, Currency::Usd), Decimal::ZERO);
    }

    #[test]
    fn test_unknown_accounts_name_their_role() {
        let f = Fixture::new();
        let id = f.account("100");

        assert!(matches!(
            f.engine.deposit(77, Currency::Usd, dec("1")),
            Err(Error::InvalidAccount { role: AccountRole::Account, id: 77 })
        ));
        assert!(matches!(
            f.engine.transfer(77, id, Currency::Usd, None, dec("1")),
            Err(Error::InvalidAccount { role: AccountRole::Sender, id: 77 })
        ));
        assert!(matches!(
            f.engine.transfer(id, 78, Currency::Usd, None, dec("1")),
            Err(Error::InvalidAccount { role: AccountRole::Receiver, id: 78 })
        ));
    }

    #[test]
    fn test_transfer_with_conversion() {
        let f = Fixture::new();
        let a = f.account("100");
        let b = f.account("0");
        f.rate(Currency::Usd, Currency::Eur, "0.9");

        let entry = f
            .engine
            .transfer(a, b, Currency::Usd, Some(Currency::Eur), dec("40"))
            .unwrap();

        assert_eq!(entry.kind, TransactionKind::MoneyTransferred);
        assert_eq!(entry.rate, dec("0.9"));
        assert_eq!(f.balance(a, Currency::Usd), dec("60"));
        assert_eq!(f.balance(b, Currency::Eur), dec("36.00"));
        assert_eq!(f.log_len(), 1);
    }

    #[test]
    fn test_transfer_same_currency_and_self_transfer() {
        let f = Fixture::new();
        let a = f.account("100");
        let b = f.account("0");

        let entry = f.engine.transfer(a, b, Currency::Usd, None, dec("25")).unwrap();
        assert_eq!(entry.to_currency, Currency::Usd);
        assert_eq!(entry.rate, Decimal::ONE);
        assert_eq!(f.balance(b, Currency::Usd), dec("25"));

        assert!(matches!(
            f.engine.transfer(a, a, Currency::Usd, None, dec("1")),
            Err(Error::SelfTransfer(id)) if id == a
        ));
    }

    #[test]
    fn test_conversion_without_rate_fails_cleanly() {
        let f = Fixture::new();
        let id = f.account("100");

        let err = f.engine.convert(id, Currency::Usd, Currency::Gbp, dec("10")).unwrap_err();
        assert!(matches!(err, Error::NoExchangeRate { from: Currency::Usd, to: Currency::Gbp }));
        assert_eq!(f.balance(id, Currency::Usd), dec("100"));
        assert_eq!(f.log_len(), 0);
    }

    #[test]
    fn test_convert_gbp_to_usd() {
        let f = Fixture::new();
        let id = f.account("100");
        f.engine.deposit(id, Currency::Gbp, dec("50")).unwrap();
        f.rate(Currency::Gbp, Currency::Usd, "1.3");

        let entry = f.engine.convert(id, Currency::Gbp, Currency::Usd, dec("50")).unwrap();
        assert_eq!(entry.kind, TransactionKind::CurrencyConverted);
        assert_eq!(entry.rate, dec("1.3"));
        assert_eq!(f.balance(id, Currency::Usd), dec("165.00"));
        assert_eq!(f.balance(id, Currency::Gbp), Decimal::ZERO);
    }

    #[test]
    fn test_storage_failure_rolls_back_balance_update() {
        let f = Fixture::new();
        let id = f.account("100");
        f.store.set_append_failure(true);

        let err = f.engine.deposit(id, Currency::Usd, dec("5")).unwrap_err();
        assert!(matches!(err, Error::StorageFailure(_)));

        f.store.set_append_failure(false);
        assert_eq!(f.balance(id, Currency::Usd), dec("100"));
        assert_eq!(f.log_len(), 0);
    }

    #[test]
    fn test_disabled_currency_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let engine = TransactionService::new(
            store.clone(),
            Arc::new(AccountLocks::new()),
            SnapshotPolicy::default(),
            vec![Currency::Usd],
        );
        let mut tx = store.begin().unwrap();
        let now = tx.now();
        let id = tx.create_account(&Balances::zero(&[Currency::Usd]), now).unwrap();
        tx.commit().unwrap();

        assert!(matches!(
            engine.deposit(id, Currency::Eur, dec("1")),
            Err(Error::InvalidCurrency(code)) if code == "EUR"
        ));
    }

    #[test]
    fn test_history_newest_first_with_filter() {
        let f = Fixture::new();
        let id = f.account("100");
        f.engine.deposit(id, Currency::Usd, dec("1")).unwrap();
        f.engine.withdraw(id, Currency::Usd, dec("2")).unwrap();
        let last = f.engine.deposit(id, Currency::Usd, dec("3")).unwrap();

        let history = f.engine.history(id, DEFAULT_HISTORY_LIMIT, None).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], last);

        let deposits = f
            .engine
            .history(id, 10, Some(TransactionKind::DepositMade))
            .unwrap();
        assert_eq!(deposits.len(), 2);
        assert_eq!(f.engine.history(id, 1, None).unwrap().len(), 1);
        assert!(f.engine.history(99, 5, None).is_err());
    }
}
