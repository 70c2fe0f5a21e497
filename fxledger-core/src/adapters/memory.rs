//! In-memory ledger store
//!
//! Keeps the whole ledger behind one mutex. A unit of work edits a private
//! copy of the state and swaps it in on commit, so a dropped transaction
//! never leaks partial writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::adapters::clock::MonotonicClock;
use crate::domain::money;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountId, Balances, Currency, ExchangeRate, NewTransaction, Snapshot,
    SnapshotSource, Transaction, TransactionKind,
};
use crate::ports::{LedgerStore, StoreTransaction};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    transactions: Vec<Transaction>,
    rates: Vec<ExchangeRate>,
    snapshots: Vec<Snapshot>,
}

/// Ledger store without persistence, used by tests and `--memory` runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    clock: MonotonicClock,
    fail_appends: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `append_transaction` fail with a storage error
    ///
    /// Lets callers check that a mutation failing halfway leaves no trace.
    pub fn set_append_failure(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl LedgerStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let guard = self
            .state
            .lock()
            .map_err(|_| Error::storage("memory store lock poisoned"))?;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            work,
            store: self,
        }))
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, MemoryState>,
    work: MemoryState,
    store: &'a MemoryStore,
}

impl MemoryTransaction<'_> {
    fn account_mut(&mut self, id: AccountId) -> Result<&mut Account> {
        self.work
            .accounts
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_account(id))
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.store.clock.tick()
    }

    fn create_account(&mut self, balances: &Balances, created_at: DateTime<Utc>) -> Result<AccountId> {
        let id = self.work.accounts.len() as AccountId + 1;
        self.work.accounts.insert(
            id,
            Account {
                id,
                balances: balances.clone(),
                opening_balances: balances.clone(),
                created_at,
            },
        );
        Ok(id)
    }

    fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.work.accounts.get(&id).cloned())
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.work.accounts.values().cloned().collect())
    }

    fn adjust_balance(&mut self, id: AccountId, currency: Currency, delta: Decimal) -> Result<()> {
        let account = self.account_mut(id)?;
        let available = account.balance(currency);
        let next = match money::checked_add(available, delta) {
            Some(next) if next >= Decimal::ZERO => next,
            None if delta.is_sign_positive() => {
                return Err(Error::out_of_range(format!(
                    "{} balance of account {} ({} + {})",
                    currency, id, available, delta
                )));
            }
            _ => {
                return Err(Error::InsufficientBalance {
                    account: id,
                    currency,
                    available,
                    requested: -delta,
                });
            }
        };
        account.balances = account.balances.with_balance(currency, next);
        Ok(())
    }

    fn append_transaction(&mut self, entry: &NewTransaction) -> Result<Transaction> {
        if self.store.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::storage("transaction log write rejected"));
        }
        let id = self.work.transactions.len() as i64 + 1;
        let tx = Transaction::from_new(id, self.now(), entry);
        self.work.transactions.push(tx.clone());
        Ok(tx)
    }

    fn transactions_in_range(
        &self,
        account: AccountId,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let mut entries: Vec<Transaction> = self
            .work
            .transactions
            .iter()
            .filter(|tx| tx.touches(account) && tx.timestamp > after && tx.timestamp <= until)
            .cloned()
            .collect();
        entries.sort_by_key(|tx| (tx.timestamp, tx.id));
        Ok(entries)
    }

    fn recent_transactions(
        &self,
        account: AccountId,
        limit: usize,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<Transaction>> {
        let mut entries: Vec<Transaction> = self
            .work
            .transactions
            .iter()
            .filter(|tx| tx.touches(account) && kind.map_or(true, |k| tx.kind == k))
            .cloned()
            .collect();
        entries.sort_by_key(|tx| std::cmp::Reverse((tx.timestamp, tx.id)));
        entries.truncate(limit);
        Ok(entries)
    }

    fn count_transactions(&self, account: AccountId) -> Result<u64> {
        Ok(self
            .work
            .transactions
            .iter()
            .filter(|tx| tx.touches(account))
            .count() as u64)
    }

    fn total_transactions(&self) -> Result<u64> {
        Ok(self.work.transactions.len() as u64)
    }

    fn insert_rate(
        &mut self,
        from: Currency,
        to: Currency,
        rate: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<ExchangeRate> {
        let row = ExchangeRate {
            id: self.work.rates.len() as i64 + 1,
            timestamp,
            from_currency: from,
            to_currency: to,
            rate,
        };
        self.work.rates.push(row.clone());
        Ok(row)
    }

    fn latest_rate(&self, from: Currency, to: Currency) -> Result<Option<ExchangeRate>> {
        Ok(self
            .work
            .rates
            .iter()
            .filter(|r| r.from_currency == from && r.to_currency == to)
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    fn rate_at_or_before(
        &self,
        from: Currency,
        to: Currency,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>> {
        Ok(self
            .work
            .rates
            .iter()
            .filter(|r| r.from_currency == from && r.to_currency == to && r.timestamp <= timestamp)
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    fn all_rates(&self) -> Result<Vec<ExchangeRate>> {
        let mut rates = self.work.rates.clone();
        rates.sort_by_key(|r| (r.timestamp, r.id));
        Ok(rates)
    }

    fn create_snapshot(
        &mut self,
        account: AccountId,
        balances: &Balances,
        timestamp: DateTime<Utc>,
        source: SnapshotSource,
    ) -> Result<Snapshot> {
        let snapshot = Snapshot {
            id: Some(self.work.snapshots.len() as i64 + 1),
            account_id: account,
            timestamp,
            balances: balances.clone(),
            source,
        };
        self.work.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    fn latest_snapshot_at_or_before(
        &self,
        account: AccountId,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Snapshot>> {
        Ok(self
            .work
            .snapshots
            .iter()
            .filter(|s| s.account_id == account && s.timestamp <= timestamp)
            .max_by_key(|s| (s.timestamp, s.id))
            .cloned())
    }

    fn snapshots_for_account(&self, account: AccountId) -> Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .work
            .snapshots
            .iter()
            .filter(|s| s.account_id == account)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| (s.timestamp, s.id));
        Ok(snapshots)
    }

    fn total_snapshots(&self) -> Result<u64> {
        Ok(self.work.snapshots.len() as u64)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            mut guard, work, ..
        } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opening() -> Balances {
        Balances::zero(&Currency::ALL).with_delta(Currency::Usd, Decimal::new(100, 0))
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().unwrap();
            let now = tx.now();
            tx.create_account(&opening(), now).unwrap();
            // dropped without commit
        }

        let tx = store.begin().unwrap();
        assert!(tx.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let now = tx.now();
        let id = tx.create_account(&opening(), now).unwrap();
        tx.adjust_balance(id, Currency::Usd, Decimal::new(-40, 0)).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        let account = tx.get_account(id).unwrap().unwrap();
        assert_eq!(account.balance(Currency::Usd), Decimal::new(60, 0));
        assert_eq!(account.opening_balances.get(Currency::Usd), Decimal::new(100, 0));
    }

    #[test]
    fn test_adjust_balance_refuses_overdraft() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let now = tx.now();
        let id = tx.create_account(&opening(), now).unwrap();

        let err = tx
            .adjust_balance(id, Currency::Usd, Decimal::new(-101, 0))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));

        let err = tx.adjust_balance(99, Currency::Usd, Decimal::ONE).unwrap_err();
        assert!(matches!(err, Error::InvalidAccount { id: 99, .. }));
    }

    #[test]
    fn test_adjust_balance_refuses_overflow() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let now = tx.now();
        let id = tx.create_account(&opening(), now).unwrap();

        let err = tx.adjust_balance(id, Currency::Usd, Decimal::MAX).unwrap_err();
        assert_eq!(err.code(), "amount_out_of_range");
        let err = tx.adjust_balance(id, Currency::Usd, money::MAX_AMOUNT).unwrap_err();
        assert_eq!(err.code(), "amount_out_of_range");
        let err = tx.adjust_balance(id, Currency::Usd, Decimal::MIN).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));

        let account = tx.get_account(id).unwrap().unwrap();
        assert_eq!(account.balance(Currency::Usd), Decimal::new(100, 0));
    }

    #[test]
    fn test_rate_lookup_is_latest_at_or_before() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let t1 = tx.now();
        tx.insert_rate(Currency::Usd, Currency::Eur, Decimal::new(110, 2), t1).unwrap();
        let t2 = tx.now();
        tx.insert_rate(Currency::Usd, Currency::Eur, Decimal::new(120, 2), t2).unwrap();

        let at_t1 = tx.rate_at_or_before(Currency::Usd, Currency::Eur, t1).unwrap().unwrap();
        assert_eq!(at_t1.rate, Decimal::new(110, 2));
        let latest = tx.latest_rate(Currency::Usd, Currency::Eur).unwrap().unwrap();
        assert_eq!(latest.rate, Decimal::new(120, 2));
        assert!(tx
            .rate_at_or_before(Currency::Usd, Currency::Eur, t1 - chrono::Duration::seconds(1))
            .unwrap()
            .is_none());
    }
}
