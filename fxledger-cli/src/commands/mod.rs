//! CLI command implementations

pub mod balance;
pub mod convert;
pub mod create_account;
pub mod deposit;
pub mod doctor;
pub mod history;
pub mod logs;
pub mod rate;
pub mod snapshot;
pub mod status;
pub mod transfer;
pub mod withdraw;

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use fxledger_core::{LedgerContext, LoggingService, OperationResult};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let ledger_dir = get_ledger_dir().ok()?;
    std::fs::create_dir_all(&ledger_dir).ok()?;
    LoggingService::new(&ledger_dir, env!("CARGO_PKG_VERSION")).ok()
}

/// Get the ledger directory from environment or default
pub fn get_ledger_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FXLEDGER_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".fxledger"))
        .context("Could not find home directory; set FXLEDGER_DIR")
}

/// Open the ledger, creating its directory on first use
pub fn get_context() -> Result<LedgerContext> {
    let ledger_dir = get_ledger_dir()?;

    std::fs::create_dir_all(&ledger_dir)
        .with_context(|| format!("Failed to create ledger directory: {:?}", ledger_dir))?;

    LedgerContext::new(&ledger_dir).context("Failed to open ledger")
}

/// Log the outcome of a ledger command to the event log
///
/// Logging failures are ignored; they never break a command.
pub fn record<T>(command: &str, result: &fxledger_core::Result<T>) {
    let Some(logger) = get_logger() else {
        return;
    };
    let _ = match result {
        Ok(_) => logger.log_command(command),
        Err(e) => logger.log_failure(command, e.code()),
    };
}

/// Record the outcome of a ledger command and print it
///
/// With `json` the value (or the error and its code) is printed as an
/// `OperationResult`; otherwise `render` prints the value.
pub fn finish<T: Serialize>(
    command: &str,
    json: bool,
    result: fxledger_core::Result<T>,
    render: impl FnOnce(&T),
) -> Result<()> {
    record(command, &result);
    match result {
        Ok(value) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&OperationResult::ok(&value))?);
            } else {
                render(&value);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&OperationResult::<T>::fail(&e))?);
            }
            Err(e.into())
        }
    }
}
