//! Per-account mutation locks

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::domain::result::{Error, Result};
use crate::domain::AccountId;

/// Serializes mutations per account
///
/// A caller acquires every account it touches in one call. The ids are taken
/// together, in ascending order, so two transfers between the same pair of
/// accounts can never each hold one lock while waiting for the other.
#[derive(Debug, Default)]
pub struct AccountLocks {
    held: Mutex<HashSet<AccountId>>,
    released: Condvar,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every id in `ids` is free, then hold them all
    pub fn acquire(&self, ids: &[AccountId]) -> Result<AccountLockGuard<'_>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut held = self.lock_set()?;
        while ids.iter().any(|id| held.contains(id)) {
            held = self
                .released
                .wait(held)
                .map_err(|_| Error::storage("account lock table poisoned"))?;
        }
        held.extend(ids.iter().copied());

        Ok(AccountLockGuard { locks: self, ids })
    }

    fn lock_set(&self) -> Result<MutexGuard<'_, HashSet<AccountId>>> {
        self.held
            .lock()
            .map_err(|_| Error::storage("account lock table poisoned"))
    }
}

/// Held account locks, released on drop
#[derive(Debug)]
pub struct AccountLockGuard<'a> {
    locks: &'a AccountLocks,
    ids: Vec<AccountId>,
}

impl AccountLockGuard<'_> {
    pub fn ids(&self) -> &[AccountId] {
        &self.ids
    }
}

impl Drop for AccountLockGuard<'_> {
    fn drop(&mut self) {
        // A poisoned table still has to give the ids back
        let mut held = match self.locks.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        for id in &self.ids {
            held.remove(id);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
