//! Ledger store port - persistence abstraction

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{
    Account, AccountId, Balances, Currency, ExchangeRate, NewTransaction, Snapshot,
    SnapshotSource, Transaction, TransactionKind,
};

/// Ledger storage abstraction
///
/// All reads and writes go through a [`StoreTransaction`] obtained from
/// [`LedgerStore::begin`]. A unit of work either commits as a whole or, when
/// dropped without [`StoreTransaction::commit`], leaves stored state untouched.
pub trait LedgerStore: Send + Sync {
    /// Start a unit of work with a consistent view of the ledger
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>>;
}

/// One atomic unit of work against the ledger store
pub trait StoreTransaction {
    /// Next timestamp from the store clock
    ///
    /// Strictly increasing across every call on the same store, so commit order
    /// and timestamp order agree.
    fn now(&self) -> DateTime<Utc>;

    // === Accounts ===

    /// Insert an account holding `balances` as both its opening and current balances
    fn create_account(&mut self, balances: &Balances, created_at: DateTime<Utc>) -> Result<AccountId>;

    fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Add `delta` to one balance
    ///
    /// Fails with `InvalidAccount` for an unknown account and with
    /// `InsufficientBalance` when the result would be negative.
    fn adjust_balance(&mut self, id: AccountId, currency: Currency, delta: Decimal) -> Result<()>;

    // === Transaction log ===

    /// Append a log entry, assigning its id and commit timestamp
    fn append_transaction(&mut self, entry: &NewTransaction) -> Result<Transaction>;

    /// Entries touching `account` with `after < timestamp <= until`, ordered by
    /// timestamp then id
    fn transactions_in_range(
        &self,
        account: AccountId,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Transaction>>;

    /// Most recent entries touching `account`, newest first
    fn recent_transactions(
        &self,
        account: AccountId,
        limit: usize,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<Transaction>>;

    /// Number of entries touching `account`
    fn count_transactions(&self, account: AccountId) -> Result<u64>;

    fn total_transactions(&self) -> Result<u64>;

    // === Exchange rates ===

    fn insert_rate(
        &mut self,
        from: Currency,
        to: Currency,
        rate: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<ExchangeRate>;

    /// Most recently inserted row for the pair
    fn latest_rate(&self, from: Currency, to: Currency) -> Result<Option<ExchangeRate>>;

    /// Most recent row for the pair with `row.timestamp <= timestamp`
    fn rate_at_or_before(
        &self,
        from: Currency,
        to: Currency,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>>;

    /// Full rate history, oldest first
    fn all_rates(&self) -> Result<Vec<ExchangeRate>>;

    // === Snapshots ===

    fn create_snapshot(
        &mut self,
        account: AccountId,
        balances: &Balances,
        timestamp: DateTime<Utc>,
        source: SnapshotSource,
    ) -> Result<Snapshot>;

    fn latest_snapshot_at_or_before(
        &self,
        account: AccountId,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Snapshot>>;

    /// Every persisted snapshot of `account`, oldest first
    fn snapshots_for_account(&self, account: AccountId) -> Result<Vec<Snapshot>>;

    fn total_snapshots(&self) -> Result<u64>;

    // === Completion ===

    /// Make every write of this unit of work durable
    fn commit(self: Box<Self>) -> Result<()>;
}
