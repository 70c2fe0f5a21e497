//! Logging service - structured command event log in DuckDB
//!
//! Stores privacy-safe events in logs.duckdb next to the ledger database.
//! Only event names, command names and error codes are recorded. Amounts,
//! balances, rates and account ids never reach this log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use duckdb::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::MigrationService;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    let timestamp = now_ms() as u64;
    // Lower 16 bits hold the counter, 65536 unique IDs per millisecond
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// A log event to be recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Stable error code (see `Error::code`), never the error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            command: None,
            error_code: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    /// Unix milliseconds
    pub timestamp: i64,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub error_code: Option<String>,
}

/// Aggregate view of the event log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogStats {
    pub total: u64,
    pub errors: u64,
    /// Executions per command name
    pub commands: BTreeMap<String, u64>,
    /// Occurrences per error code
    pub error_codes: BTreeMap<String, u64>,
}

/// Service for structured event logging
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create logs.duckdb in `ledger_dir` and run pending migrations
    pub fn new(ledger_dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        let db_path = ledger_dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;
        MigrationService::with_migrations(&conn, LOG_MIGRATIONS).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            app_version: app_version.into(),
            platform: detect_platform(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::storage("log connection lock poisoned"))
    }

    /// Record an event, stamped with app version and platform
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_logs (id, timestamp, app_version, platform, event, command, error_code)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                generate_id(),
                now_ms(),
                &self.app_version,
                self.platform,
                &event.event,
                &event.command,
                &event.error_code,
            ],
        )?;
        Ok(())
    }

    /// Log a successful CLI command
    pub fn log_command(&self, command: &str) -> Result<()> {
        self.log(LogEvent::new("command_executed").with_command(command))
    }

    /// Log a failed CLI command by error code
    pub fn log_failure(&self, command: &str, error_code: &str) -> Result<()> {
        self.log(
            LogEvent::new("command_failed")
                .with_command(command)
                .with_error_code(error_code),
        )
    }

    /// Most recent entries, newest first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query_entries(
            "SELECT id, timestamp, app_version, platform, event, command, error_code
             FROM sys_logs ORDER BY timestamp DESC, id DESC LIMIT ?",
            limit,
        )
    }

    /// Most recent entries carrying an error code
    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query_entries(
            "SELECT id, timestamp, app_version, platform, event, command, error_code
             FROM sys_logs WHERE error_code IS NOT NULL
             ORDER BY timestamp DESC, id DESC LIMIT ?",
            limit,
        )
    }

    fn query_entries(&self, sql: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let entries = stmt
            .query_map([limit as i64], |row| {
                Ok(LogEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    app_version: row.get(2)?,
                    platform: row.get(3)?,
                    event: row.get(4)?,
                    command: row.get(5)?,
                    error_code: row.get(6)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn stats(&self) -> Result<LogStats> {
        let conn = self.lock()?;
        let mut stats = LogStats::default();

        let (total, errors): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(error_code) FROM sys_logs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total = total as u64;
        stats.errors = errors as u64;

        let mut stmt = conn.prepare(
            "SELECT command, COUNT(*) FROM sys_logs WHERE command IS NOT NULL GROUP BY command",
        )?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (command, n) = row?;
            stats.commands.insert(command, n as u64);
        }

        let mut stmt = conn.prepare(
            "SELECT error_code, COUNT(*) FROM sys_logs WHERE error_code IS NOT NULL GROUP BY error_code",
        )?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (code, n) = row?;
            stats.error_codes.insert(code, n as u64);
        }

        Ok(stats)
    }

    /// Delete logs older than the given unix-ms timestamp
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    /// Delete every entry
    pub fn clear(&self) -> Result<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM sys_logs", [])?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
