//! fxledger core - multi-currency ledger with point-in-time reconstruction
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Account, Transaction, Snapshot, ...) and errors
//! - **ports**: Trait definitions for external dependencies (LedgerStore)
//! - **services**: Transaction engine, rate registry, snapshots, reconstruction
//! - **adapters**: Concrete implementations (DuckDB, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adapters::duckdb::DuckDbStore;
use adapters::memory::MemoryStore;
use config::Config;
use ports::LedgerStore;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result};
pub use domain::{
    Account, AccountId, Balances, Currency, ExchangeRate, Snapshot, Transaction, TransactionKind,
};
pub use services::{LogEvent, LoggingService};

/// File name of the ledger database inside the ledger directory
pub const LEDGER_DB_FILE: &str = "ledger.duckdb";

/// Main context for ledger operations
///
/// This is the primary entry point for all business logic. It holds the
/// store handle, configuration, and all services. Every service shares the
/// same store and, for mutations, the same account locks.
pub struct LedgerContext {
    pub config: Config,
    pub store: Arc<dyn LedgerStore>,
    /// `None` for an in-memory ledger
    pub db_path: Option<PathBuf>,
    pub account_service: AccountService,
    pub transaction_service: TransactionService,
    pub exchange_rate_service: ExchangeRateService,
    pub snapshot_service: SnapshotService,
    pub reconstruction_service: ReconstructionService,
    pub status_service: StatusService,
    pub doctor_service: DoctorService,
}

impl LedgerContext {
    /// Open the ledger stored in `ledger_dir`
    pub fn new(ledger_dir: &Path) -> Result<Self> {
        let config = Config::load(ledger_dir)?;
        let db_path = ledger_dir.join(LEDGER_DB_FILE);
        let store: Arc<dyn LedgerStore> = Arc::new(DuckDbStore::new(&db_path)?);
        Self::with_store(config, store, Some(db_path))
    }

    /// Ledger that lives only in this process
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()), None)
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn LedgerStore>,
        db_path: Option<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let policy = SnapshotPolicy::new(config.snapshot_interval)?;
        let currencies = config.currencies.clone();
        let locks = Arc::new(AccountLocks::new());

        Ok(Self {
            account_service: AccountService::new(Arc::clone(&store), currencies.clone()),
            transaction_service: TransactionService::new(
                Arc::clone(&store),
                locks,
                policy,
                currencies.clone(),
            ),
            exchange_rate_service: ExchangeRateService::new(Arc::clone(&store), currencies.clone()),
            snapshot_service: SnapshotService::new(Arc::clone(&store), policy),
            reconstruction_service: ReconstructionService::new(Arc::clone(&store), currencies.clone()),
            status_service: StatusService::new(Arc::clone(&store), policy, currencies),
            doctor_service: DoctorService::new(Arc::clone(&store), policy),
            config,
            store,
            db_path,
        })
    }
}
