//! Core domain entities
//!
//! All ledger entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
pub mod balance;
mod currency;
mod exchange_rate;
pub mod money;
pub mod result;
mod transaction;

pub use account::{Account, AccountId, AccountRole};
pub use balance::{Balances, Snapshot, SnapshotSource};
pub use currency::Currency;
pub use exchange_rate::ExchangeRate;
pub use transaction::{NewTransaction, Transaction, TransactionId, TransactionKind};
