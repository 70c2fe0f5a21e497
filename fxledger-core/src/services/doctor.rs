//! Doctor service - ledger integrity checks

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::domain::money;
use crate::domain::result::Result;
use crate::domain::ExchangeRate;
use crate::ports::LedgerStore;

use super::reconstruction::{full_replay_in, reconstruct_in};
use super::snapshot::SnapshotPolicy;

pub struct DoctorService {
    store: Arc<dyn LedgerStore>,
    policy: SnapshotPolicy,
}

impl DoctorService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: SnapshotPolicy) -> Self {
        Self { store, policy }
    }

    /// Run all checks against one consistent view of the ledger
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let tx = self.store.begin()?;
        let now = tx.now();
        let accounts = tx.list_accounts()?;
        let mut checks = BTreeMap::new();

        // Non-negative balances
        let negative: Vec<serde_json::Value> = accounts
            .iter()
            .filter_map(|a| {
                a.balances.first_negative().map(|c| {
                    json!({"account_id": a.id, "currency": c, "balance": a.balance(c)})
                })
            })
            .collect();
        checks.insert(
            "negative_balances".to_string(),
            CheckResult::from_findings(
                negative,
                CheckStatus::Error,
                "No account holds a negative balance".to_string(),
                |n| format!("{} account(s) hold a negative balance", n),
            ),
        );

        // Live balances against a replay of the whole log
        let mut drifted = Vec::new();
        for account in &accounts {
            let replayed = full_replay_in(tx.as_ref(), account.id, now)?;
            if replayed != account.balances {
                drifted.push(json!({
                    "account_id": account.id,
                    "live": account.balances,
                    "replayed": replayed,
                }));
            }
        }
        checks.insert(
            "live_balances".to_string(),
            CheckResult::from_findings(
                drifted,
                CheckStatus::Error,
                "Live balances match a replay of the transaction log".to_string(),
                |n| format!("{} account(s) differ from their replayed log", n),
            ),
        );

        // Snapshots against a replay up to their timestamp
        let mut bad_snapshots = Vec::new();
        let mut snapshot_count = 0;
        for account in &accounts {
            for snapshot in tx.snapshots_for_account(account.id)? {
                snapshot_count += 1;
                let replayed = full_replay_in(tx.as_ref(), account.id, snapshot.timestamp)?;
                if replayed != snapshot.balances {
                    bad_snapshots.push(json!({
                        "snapshot_id": snapshot.id,
                        "account_id": account.id,
                        "timestamp": snapshot.timestamp,
                    }));
                }
            }
        }
        checks.insert(
            "snapshot_consistency".to_string(),
            CheckResult::from_findings(
                bad_snapshots,
                CheckStatus::Error,
                format!("All {} snapshot(s) match the transaction log", snapshot_count),
                |n| format!("{} snapshot(s) disagree with the transaction log", n),
            ),
        );

        // Replay cost stays within the snapshot cadence
        let limit = self.policy.interval().saturating_sub(1) as usize;
        let mut long_replays = Vec::new();
        for account in &accounts {
            let point = reconstruct_in(tx.as_ref(), account.id, now)?;
            if point.replayed > limit {
                long_replays.push(json!({
                    "account_id": account.id,
                    "replayed": point.replayed,
                    "limit": limit,
                }));
            }
        }
        checks.insert(
            "replay_length".to_string(),
            CheckResult::from_findings(
                long_replays,
                CheckStatus::Warning,
                format!("Every account replays at most {} transaction(s)", limit),
                |n| format!("{} account(s) replay more than {} transaction(s)", n, limit),
            ),
        );

        // Each rate row has its reciprocal partner
        let rates = tx.all_rates()?;
        let unpaired: Vec<serde_json::Value> = rates
            .iter()
            .filter(|r| !has_partner(r, &rates))
            .map(|r| {
                json!({
                    "exchange_id": r.id,
                    "pair": format!("{}->{}", r.from_currency, r.to_currency),
                    "rate": r.rate,
                })
            })
            .collect();
        checks.insert(
            "reciprocal_rates".to_string(),
            CheckResult::from_findings(
                unpaired,
                CheckStatus::Warning,
                format!("All {} rate row(s) have a reciprocal partner", rates.len()),
                |n| format!("{} rate row(s) lack a matching reciprocal", n),
            ),
        );

        let passed = checks.values().filter(|c| c.status == CheckStatus::Pass).count() as u64;
        let warnings = checks.values().filter(|c| c.status == CheckStatus::Warning).count() as u64;
        let errors = checks.values().filter(|c| c.status == CheckStatus::Error).count() as u64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }
}

/// A row's partner is the opposite direction written at the same instant,
/// one of the two being the rounded reciprocal of the other
fn has_partner(row: &ExchangeRate, rates: &[ExchangeRate]) -> bool {
    rates.iter().any(|other| {
        other.timestamp == row.timestamp
            && other.from_currency == row.to_currency
            && other.to_currency == row.from_currency
            && (money::reciprocal(row.rate) == Some(other.rate)
                || money::reciprocal(other.rate) == Some(row.rate))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn from_findings(
        findings: Vec<serde_json::Value>,
        severity: CheckStatus,
        pass_message: String,
        fail_message: impl Fn(usize) -> String,
    ) -> Self {
        if findings.is_empty() {
            Self {
                status: CheckStatus::Pass,
                message: pass_message,
                details: None,
            }
        } else {
            Self {
                status: severity,
                message: fail_message(findings.len()),
                details: Some(findings),
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: u64,
    pub warnings: u64,
    pub errors: u64,
}
