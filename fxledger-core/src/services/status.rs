//! Status service - ledger summary

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{AccountId, Balances, Currency};
use crate::ports::LedgerStore;

use super::snapshot::SnapshotPolicy;

pub struct StatusService {
    store: Arc<dyn LedgerStore>,
    policy: SnapshotPolicy,
    currencies: Vec<Currency>,
}

impl StatusService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: SnapshotPolicy, currencies: Vec<Currency>) -> Self {
        Self {
            store,
            policy,
            currencies,
        }
    }

    pub fn get_status(&self) -> Result<StatusSummary> {
        let tx = self.store.begin()?;
        let accounts = tx.list_accounts()?;
        let rate_rows = tx.all_rates()?.len() as u64;

        let mut summaries = Vec::with_capacity(accounts.len());
        for account in accounts {
            let transactions = tx.count_transactions(account.id)?;
            let latest = tx.recent_transactions(account.id, 1, None)?;
            summaries.push(AccountSummary {
                id: account.id,
                created_at: account.created_at,
                transactions,
                snapshots: tx.snapshots_for_account(account.id)?.len() as u64,
                last_activity: latest.first().map(|t| t.timestamp),
                balances: account.balances,
            });
        }

        Ok(StatusSummary {
            total_accounts: summaries.len() as u64,
            total_transactions: tx.total_transactions()?,
            total_snapshots: tx.total_snapshots()?,
            total_rate_rows: rate_rows,
            currencies: self.currencies.clone(),
            snapshot_interval: self.policy.interval(),
            accounts: summaries,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_accounts: u64,
    pub total_transactions: u64,
    pub total_snapshots: u64,
    pub total_rate_rows: u64,
    pub currencies: Vec<Currency>,
    pub snapshot_interval: u64,
    pub accounts: Vec<AccountSummary>,
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub created_at: DateTime<Utc>,
    pub transactions: u64,
    pub snapshots: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub balances: Balances,
}
