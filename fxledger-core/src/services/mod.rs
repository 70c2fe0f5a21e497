//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod account;
mod doctor;
pub mod exchange_rate;
pub mod locks;
pub mod logging;
pub mod migration;
pub mod reconstruction;
pub mod snapshot;
mod status;
pub mod transaction;

pub use account::AccountService;
pub use doctor::{CheckResult, CheckStatus, DoctorResult, DoctorService, DoctorSummary};
pub use exchange_rate::{ExchangeRateService, RateUpdate};
pub use locks::AccountLocks;
pub use logging::{LogEntry, LogEvent, LogStats, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use reconstruction::{PointInTimeBalances, ReconstructionService, Valuation, ValuationLine};
pub use snapshot::{SnapshotPolicy, SnapshotService};
pub use status::{AccountSummary, StatusService, StatusSummary};
pub use transaction::TransactionService;

use crate::domain::result::{Error, Result};
use crate::domain::Currency;

/// Reject currencies this deployment has not enabled
pub(crate) fn ensure_enabled(enabled: &[Currency], currency: Currency) -> Result<()> {
    if enabled.contains(&currency) {
        Ok(())
    } else {
        Err(Error::InvalidCurrency(currency.code().to_string()))
    }
}
