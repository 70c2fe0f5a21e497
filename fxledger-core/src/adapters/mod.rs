//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the persistent LedgerStore
//! - An in-memory LedgerStore for tests and throwaway sessions

pub mod clock;
pub mod duckdb;
pub mod memory;
