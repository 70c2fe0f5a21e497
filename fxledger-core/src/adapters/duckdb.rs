//! DuckDB ledger store implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;

use crate::adapters::clock::MonotonicClock;
use crate::domain::money;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountId, Balances, Currency, ExchangeRate, NewTransaction, Snapshot,
    SnapshotSource, Transaction, TransactionKind,
};
use crate::ports::{LedgerStore, StoreTransaction};
use crate::services::{MigrationResult, MigrationService};

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::StorageFailure(err.to_string())
    }
}

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Timestamp layout written to DuckDB, microsecond precision like TIMESTAMP itself
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const TRANSACTION_COLUMNS: &str = "transaction_id, kind, from_account, to_account, created_at::VARCHAR,
     from_currency, to_currency, amount::VARCHAR, rate::VARCHAR";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed ledger store
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    clock: MonotonicClock,
}

impl DuckDbStore {
    /// Open (or create) the ledger database at `db_path`
    ///
    /// Retries with exponential backoff while another process holds the file.
    /// The schema is migrated and the commit clock seeded before returning.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => return Self::from_connection(conn, Some(db_path.to_path_buf())),
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            "ledger database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map(Error::from).unwrap_or_else(|| {
            Error::storage(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Ledger database that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Self::from_connection(conn, None)
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading stays off: the schema needs nothing beyond core DuckDB
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    fn from_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            clock: MonotonicClock::new(),
        };
        store.run_migrations()?;
        if let Some(latest) = store.latest_persisted_timestamp()? {
            store.clock.seed(latest);
        }
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run pending schema migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Applied and pending migration names, for status reporting
    pub fn migration_state(&self) -> Result<(Vec<String>, Vec<String>)> {
        let conn = self.lock()?;
        let service = MigrationService::new(&conn);
        Ok((service.get_applied()?, service.get_pending()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::storage("ledger connection lock poisoned"))
    }

    fn latest_persisted_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(ts)::VARCHAR FROM (
                 SELECT MAX(created_at) AS ts FROM accounts
                 UNION ALL SELECT MAX(created_at) FROM transactions
                 UNION ALL SELECT MAX(rate_time) FROM exchange_rates
                 UNION ALL SELECT MAX(snapshot_time) FROM snapshots
             )",
            [],
            |row| row.get(0),
        )?;
        latest.as_deref().map(parse_timestamp).transpose()
    }
}

impl LedgerStore for DuckDbStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(Box::new(DuckDbTransaction {
            conn,
            clock: &self.clock,
            finished: false,
        }))
    }
}

/// Open DuckDB transaction; rolled back on drop unless committed
struct DuckDbTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    clock: &'a MonotonicClock,
    finished: bool,
}

impl Drop for DuckDbTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!("ledger rollback failed: {}", e);
            }
        }
    }
}

impl DuckDbTransaction<'_> {
    fn account_exists(&self, id: AccountId) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE account_id = ?",
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn read_balances(&self, id: AccountId) -> Result<(Balances, Balances)> {
        let mut stmt = self.conn.prepare(
            "SELECT currency, balance::VARCHAR, opening_balance::VARCHAR
             FROM account_balances WHERE account_id = ? ORDER BY currency",
        )?;
        let rows = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        let mut current = Vec::with_capacity(rows.len());
        let mut opening = Vec::with_capacity(rows.len());
        for (code, balance, opening_balance) in rows {
            let currency = Currency::from_str(&code)?;
            current.push((currency, parse_decimal(&balance)?));
            opening.push((currency, parse_decimal(&opening_balance)?));
        }
        Ok((Balances::from_pairs(current), Balances::from_pairs(opening)))
    }

    fn query_transactions(
        &self,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(RawTransaction {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    from_account: row.get(2)?,
                    to_account: row.get(3)?,
                    created_at: row.get(4)?,
                    from_currency: row.get(5)?,
                    to_currency: row.get(6)?,
                    amount: row.get(7)?,
                    rate: row.get(8)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(RawTransaction::into_transaction).collect()
    }

    fn query_rates(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<ExchangeRate>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, time, from, to, rate)| {
                Ok(ExchangeRate {
                    id,
                    timestamp: parse_timestamp(&time)?,
                    from_currency: Currency::from_str(&from)?,
                    to_currency: Currency::from_str(&to)?,
                    rate: parse_decimal(&rate)?,
                })
            })
            .collect()
    }

    fn query_snapshots(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<Snapshot>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, account_id, time, balances, source)| {
                Ok(Snapshot {
                    id: Some(id),
                    account_id,
                    timestamp: parse_timestamp(&time)?,
                    balances: serde_json::from_str(&balances)?,
                    source: SnapshotSource::from_str(&source)?,
                })
            })
            .collect()
    }
}

impl StoreTransaction for DuckDbTransaction<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.clock.tick()
    }

    fn create_account(&mut self, balances: &Balances, created_at: DateTime<Utc>) -> Result<AccountId> {
        let id: AccountId = self.conn.query_row(
            "INSERT INTO accounts (created_at) VALUES (CAST(? AS TIMESTAMP)) RETURNING account_id",
            [format_timestamp(&created_at)],
            |row| row.get(0),
        )?;

        for (currency, amount) in balances.iter() {
            let amount = amount.to_string();
            self.conn.execute(
                "INSERT INTO account_balances (account_id, currency, balance, opening_balance)
                 VALUES (?, ?, CAST(? AS DECIMAL(18,2)), CAST(? AS DECIMAL(18,2)))",
                params![id, currency.code(), amount, amount],
            )?;
        }
        Ok(id)
    }

    fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let mut stmt = self
            .conn
            .prepare("SELECT created_at::VARCHAR FROM accounts WHERE account_id = ?")?;
        let created: Vec<String> = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        let Some(created_at) = created.first() else {
            return Ok(None);
        };

        let (balances, opening_balances) = self.read_balances(id)?;
        Ok(Some(Account {
            id,
            balances,
            opening_balances,
            created_at: parse_timestamp(created_at)?,
        }))
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let mut stmt = self
            .conn
            .prepare("SELECT account_id FROM accounts ORDER BY account_id")?;
        let ids: Vec<AccountId> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;

        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.get_account(id)? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    fn adjust_balance(&mut self, id: AccountId, currency: Currency, delta: Decimal) -> Result<()> {
        if !self.account_exists(id)? {
            return Err(Error::invalid_account(id));
        }

        let mut stmt = self.conn.prepare(
            "SELECT balance::VARCHAR FROM account_balances WHERE account_id = ? AND currency = ?",
        )?;
        let current: Vec<String> = stmt
            .query_map(params![id, currency.code()], |row| row.get(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        drop(stmt);

        let available = match current.first() {
            Some(s) => parse_decimal(s)?,
            None => Decimal::ZERO,
        };
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

        if current.is_empty() {
            self.conn.execute(
                "INSERT INTO account_balances (account_id, currency, balance, opening_balance)
                 VALUES (?, ?, CAST(? AS DECIMAL(18,2)), 0)",
                params![id, currency.code(), next.to_string()],
            )?;
        } else {
            self.conn.execute(
                "UPDATE account_balances SET balance = CAST(? AS DECIMAL(18,2))
                 WHERE account_id = ? AND currency = ?",
                params![next.to_string(), id, currency.code()],
            )?;
        }
        Ok(())
    }

    fn append_transaction(&mut self, entry: &NewTransaction) -> Result<Transaction> {
        let timestamp = self.now();
        let id: i64 = self.conn.query_row(
            "INSERT INTO transactions
                 (kind, from_account, to_account, created_at, from_currency, to_currency, amount, rate)
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP), ?, ?, CAST(? AS DECIMAL(18,2)), CAST(? AS DECIMAL(18,2)))
             RETURNING transaction_id",
            params![
                entry.kind.as_str(),
                entry.from_account,
                entry.to_account,
                format_timestamp(&timestamp),
                entry.from_currency.code(),
                entry.to_currency.code(),
                entry.amount.to_string(),
                entry.rate.to_string(),
            ],
            |row| row.get(0),
        )?;
        Ok(Transaction::from_new(id, timestamp, entry))
    }

    fn transactions_in_range(
        &self,
        account: AccountId,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions
             WHERE (from_account = ? OR to_account = ?)
               AND created_at > CAST(? AS TIMESTAMP) AND created_at <= CAST(? AS TIMESTAMP)
             ORDER BY created_at, transaction_id",
            TRANSACTION_COLUMNS
        );
        let after = format_timestamp(&after);
        let until = format_timestamp(&until);
        self.query_transactions(&sql, params![account, account, after, until])
    }

    fn recent_transactions(
        &self,
        account: AccountId,
        limit: usize,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<Transaction>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        match kind {
            Some(kind) => {
                let sql = format!(
                    "SELECT {} FROM transactions
                     WHERE (from_account = ? OR to_account = ?) AND kind = ?
                     ORDER BY created_at DESC, transaction_id DESC LIMIT ?",
                    TRANSACTION_COLUMNS
                );
                self.query_transactions(&sql, params![account, account, kind.as_str(), limit])
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM transactions
                     WHERE from_account = ? OR to_account = ?
                     ORDER BY created_at DESC, transaction_id DESC LIMIT ?",
                    TRANSACTION_COLUMNS
                );
                self.query_transactions(&sql, params![account, account, limit])
            }
        }
    }

    fn count_transactions(&self, account: AccountId) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE from_account = ? OR to_account = ?",
            params![account, account],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn total_transactions(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn insert_rate(
        &mut self,
        from: Currency,
        to: Currency,
        rate: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<ExchangeRate> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO exchange_rates (rate_time, from_currency, to_currency, rate)
             VALUES (CAST(? AS TIMESTAMP), ?, ?, CAST(? AS DECIMAL(18,2)))
             RETURNING exchange_id",
            params![format_timestamp(&timestamp), from.code(), to.code(), rate.to_string()],
            |row| row.get(0),
        )?;
        Ok(ExchangeRate {
            id,
            timestamp,
            from_currency: from,
            to_currency: to,
            rate,
        })
    }

    fn latest_rate(&self, from: Currency, to: Currency) -> Result<Option<ExchangeRate>> {
        let rates = self.query_rates(
            "SELECT exchange_id, rate_time::VARCHAR, from_currency, to_currency, rate::VARCHAR
             FROM exchange_rates WHERE from_currency = ? AND to_currency = ?
             ORDER BY rate_time DESC, exchange_id DESC LIMIT 1",
            params![from.code(), to.code()],
        )?;
        Ok(rates.into_iter().next())
    }

    fn rate_at_or_before(
        &self,
        from: Currency,
        to: Currency,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>> {
        let rates = self.query_rates(
            "SELECT exchange_id, rate_time::VARCHAR, from_currency, to_currency, rate::VARCHAR
             FROM exchange_rates
             WHERE from_currency = ? AND to_currency = ? AND rate_time <= CAST(? AS TIMESTAMP)
             ORDER BY rate_time DESC, exchange_id DESC LIMIT 1",
            params![from.code(), to.code(), format_timestamp(&timestamp)],
        )?;
        Ok(rates.into_iter().next())
    }

    fn all_rates(&self) -> Result<Vec<ExchangeRate>> {
        self.query_rates(
            "SELECT exchange_id, rate_time::VARCHAR, from_currency, to_currency, rate::VARCHAR
             FROM exchange_rates ORDER BY rate_time, exchange_id",
            params![],
        )
    }

    fn create_snapshot(
        &mut self,
        account: AccountId,
        balances: &Balances,
        timestamp: DateTime<Utc>,
        source: SnapshotSource,
    ) -> Result<Snapshot> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO snapshots (account_id, snapshot_time, balances, source)
             VALUES (?, CAST(? AS TIMESTAMP), ?, ?)
             RETURNING snapshot_id",
            params![
                account,
                format_timestamp(&timestamp),
                serde_json::to_string(balances)?,
                source.as_str(),
            ],
            |row| row.get(0),
        )?;
        Ok(Snapshot {
            id: Some(id),
            account_id: account,
            timestamp,
            balances: balances.clone(),
            source,
        })
    }

    fn latest_snapshot_at_or_before(
        &self,
        account: AccountId,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Snapshot>> {
        let snapshots = self.query_snapshots(
            "SELECT snapshot_id, account_id, snapshot_time::VARCHAR, balances, source
             FROM snapshots
             WHERE account_id = ? AND snapshot_time <= CAST(? AS TIMESTAMP)
             ORDER BY snapshot_time DESC, snapshot_id DESC LIMIT 1",
            params![account, format_timestamp(&timestamp)],
        )?;
        Ok(snapshots.into_iter().next())
    }

    fn snapshots_for_account(&self, account: AccountId) -> Result<Vec<Snapshot>> {
        self.query_snapshots(
            "SELECT snapshot_id, account_id, snapshot_time::VARCHAR, balances, source
             FROM snapshots WHERE account_id = ?
             ORDER BY snapshot_time, snapshot_id",
            params![account],
        )
    }

    fn total_snapshots(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.conn.execute_batch("COMMIT")?;
        this.finished = true;
        Ok(())
    }
}

/// Transaction row as read from DuckDB, before domain parsing
struct RawTransaction {
    id: i64,
    kind: String,
    from_account: i64,
    to_account: i64,
    created_at: String,
    from_currency: String,
    to_currency: String,
    amount: String,
    rate: String,
}

impl RawTransaction {
    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            id: self.id,
            kind: TransactionKind::from_str(&self.kind)?,
            from_account: self.from_account,
            to_account: self.to_account,
            timestamp: parse_timestamp(&self.created_at)?,
            from_currency: Currency::from_str(&self.from_currency)?,
            to_currency: Currency::from_str(&self.to_currency)?,
            amount: parse_decimal(&self.amount)?,
            rate: parse_decimal(&self.rate)?,
        })
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a TIMESTAMP rendered through `::VARCHAR`
///
/// DuckDB omits the fractional part when it is zero.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::storage(format!("unreadable timestamp '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str_exact(s.trim())
        .map_err(|e| Error::storage(format!("unreadable amount '{}': {}", s, e)))
}
