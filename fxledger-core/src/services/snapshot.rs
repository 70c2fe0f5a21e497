//! Snapshot manager - cadence checkpoints of account balances

use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{AccountId, Snapshot, SnapshotSource};
use crate::ports::{LedgerStore, StoreTransaction};

/// How often cadence snapshots are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotPolicy {
    interval: u64,
}

impl SnapshotPolicy {
    pub fn new(interval: u64) -> Result<Self> {
        if interval == 0 {
            return Err(Error::Config("snapshot interval must be at least 1".to_string()));
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// An account with `count` transactions is due when the count is a
    /// positive multiple of the interval
    pub fn is_due(&self, count: u64) -> bool {
        count > 0 && count % self.interval == 0
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            interval: crate::config::DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

pub struct SnapshotService {
    store: Arc<dyn LedgerStore>,
    policy: SnapshotPolicy,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: SnapshotPolicy) -> Self {
        Self { store, policy }
    }

    /// Write a cadence snapshot if the account's transaction count is due
    pub fn maybe_snapshot(&self, account: AccountId) -> Result<Option<Snapshot>> {
        let mut tx = self.store.begin()?;
        let snapshot = maybe_snapshot_in(tx.as_mut(), self.policy, account)?;
        tx.commit()?;
        Ok(snapshot)
    }

    /// Snapshot the account's current balances unconditionally
    pub fn force_snapshot(&self, account: AccountId) -> Result<Snapshot> {
        let mut tx = self.store.begin()?;
        let snapshot = write_snapshot(tx.as_mut(), account, SnapshotSource::Manual)?;
        tx.commit()?;
        tracing::info!(account, "manual snapshot written");
        Ok(snapshot)
    }

    /// Persisted snapshots of an account, oldest first
    pub fn list_snapshots(&self, account: AccountId) -> Result<Vec<Snapshot>> {
        let tx = self.store.begin()?;
        if tx.get_account(account)?.is_none() {
            return Err(Error::invalid_account(account));
        }
        tx.snapshots_for_account(account)
    }
}

/// Snapshot check run inside a mutation's unit of work
///
/// Sees the mutation's own writes, so the count includes the entry just
/// appended and the balances are the post-mutation ones.
pub(crate) fn maybe_snapshot_in(
    tx: &mut dyn StoreTransaction,
    policy: SnapshotPolicy,
    account: AccountId,
) -> Result<Option<Snapshot>> {
    let count = tx.count_transactions(account)?;
    if !policy.is_due(count) {
        tracing::debug!(account, count, interval = policy.interval(), "snapshot not due");
        return Ok(None);
    }
    let snapshot = write_snapshot(tx, account, SnapshotSource::Cadence)?;
    tracing::debug!(account, count, "cadence snapshot written");
    Ok(Some(snapshot))
}

fn write_snapshot(
    tx: &mut dyn StoreTransaction,
    account: AccountId,
    source: SnapshotSource,
) -> Result<Snapshot> {
    let current = tx
        .get_account(account)?
        .ok_or_else(|| Error::invalid_account(account))?;
    let timestamp = tx.now();
    tx.create_snapshot(account, &current.balances, timestamp, source)
}
