//! Integration tests for fxledger-core services
//!
//! These tests drive the engines through `LedgerContext` against real DuckDB
//! files and against the in-memory store.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use tempfile::TempDir;

use fxledger_core::adapters::duckdb::DuckDbStore;
use fxledger_core::config::Config;
use fxledger_core::domain::{Currency, SnapshotSource, TransactionKind};
use fxledger_core::{AccountId, Balances, Error, LedgerContext, LEDGER_DB_FILE};

// ============================================================================
// Test Helpers
// ============================================================================

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn config(interval: u64) -> Config {
    Config {
        snapshot_interval: interval,
        ..Config::default()
    }
}

/// Ledger on a fresh DuckDB file inside `temp_dir`
fn duckdb_ledger(temp_dir: &TempDir, interval: u64) -> LedgerContext {
    let db_path = temp_dir.path().join(LEDGER_DB_FILE);
    let store = DuckDbStore::new(&db_path).expect("Failed to open ledger database");
    LedgerContext::with_store(config(interval), Arc::new(store), Some(db_path))
        .expect("Failed to build ledger context")
}

fn memory_ledger(interval: u64) -> LedgerContext {
    LedgerContext::in_memory(config(interval)).unwrap()
}

fn open_account(ledger: &LedgerContext, initial: &[(Currency, &str)]) -> AccountId {
    let initial: Vec<(Currency, Decimal)> = initial.iter().map(|(c, a)| (*c, dec(a))).collect();
    ledger.account_service.create_account(&initial).unwrap().id
}

fn balances(pairs: &[(Currency, &str)]) -> Balances {
    Balances::from_pairs(pairs.iter().map(|(c, a)| (*c, dec(a))))
}

fn snapshot_count(ledger: &LedgerContext, account: AccountId) -> usize {
    ledger.snapshot_service.list_snapshots(account).unwrap().len()
}

fn log_len(ledger: &LedgerContext, account: AccountId) -> usize {
    ledger.transaction_service.history(account, usize::MAX, None).unwrap().len()
}

/// Run `n` operations cycling deposit, conversion and withdrawal; returns the
/// timestamp of the last committed entry
fn run_mixed_history(ledger: &LedgerContext, account: AccountId, n: usize) -> Option<DateTime<Utc>> {
    ledger
        .exchange_rate_service
        .update_rate(Currency::Usd, Currency::Eur, dec("0.9"))
        .unwrap();

    let mut last = None;
    for i in 0..n {
        let entry = match i % 3 {
            0 => ledger.transaction_service.deposit(account, Currency::Usd, dec("1.25")),
            1 => ledger.transaction_service.convert(account, Currency::Usd, Currency::Eur, dec("0.50")),
            _ => ledger.transaction_service.withdraw(account, Currency::Eur, dec("0.10")),
        }
        .unwrap();
        last = Some(entry.timestamp);
    }
    last
}

// ============================================================================
// Transaction Engine
// ============================================================================

#[test]
fn test_deposit_appends_exactly_one_entry() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = duckdb_ledger(&temp_dir, 50);
    let id = open_account(&ledger, &[(Currency::Usd, "100")]);

    let entry = ledger.transaction_service.deposit(id, Currency::Eur, dec("12.50")).unwrap();

    assert_eq!(entry.kind, TransactionKind::DepositMade);
    assert_eq!(entry.from_account, id);
    assert_eq!(entry.to_account, id);
    assert_eq!(
        ledger.account_service.get_balance(id).unwrap(),
        balances(&[(Currency::Usd, "100"), (Currency::Eur, "12.50")])
    );
    assert_eq!(log_len(&ledger, id), 1);
}

#[test]
fn test_rejected_withdrawal_leaves_state_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = duckdb_ledger(&temp_dir, 2);
    let id = open_account(&ledger, &[(Currency::Usd, "10")]);
    ledger.transaction_service.deposit(id, Currency::Usd, dec("5")).unwrap();

    let before = ledger.account_service.get_balance(id).unwrap();
    let err = ledger
        .transaction_service
        .withdraw(id, Currency::Usd, dec("15.01"))
        .unwrap_err();

    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert_eq!(err.code(), "insufficient_balance");
    assert_eq!(ledger.account_service.get_balance(id).unwrap(), before);
    assert_eq!(log_len(&ledger, id), 1);
    // the rejected operation would have been the second entry, due for a snapshot
    assert_eq!(snapshot_count(&ledger, id), 0);
}

#[test]
fn test_transfer_with_conversion_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = duckdb_ledger(&temp_dir, 50);
    let a = open_account(&ledger, &[(Currency::Usd, "100")]);
    let b = open_account(&ledger, &[]);
    ledger
        .exchange_rate_service
        .update_rate(Currency::Usd, Currency::Eur, dec("0.9"))
        .unwrap();

    let entry = ledger
        .transaction_service
        .transfer(a, b, Currency::Usd, Some(Currency::Eur), dec("40"))
        .unwrap();

    assert_eq!(entry.kind, TransactionKind::MoneyTransferred);
    assert_eq!(entry.rate, dec("0.90"));
    assert_eq!(ledger.account_service.get_balance(a).unwrap().get(Currency::Usd), dec("60"));
    assert_eq!(ledger.account_service.get_balance(b).unwrap().get(Currency::Eur), dec("36.00"));
    assert_eq!(log_len(&ledger, a), 1);
    assert_eq!(log_len(&ledger, b), 1);

    let at = entry.timestamp;
    assert_eq!(
        ledger.reconstruction_service.reconstruct(b, at).unwrap().balances,
        balances(&[(Currency::Eur, "36.00")])
    );
}

#[test]
fn test_gbp_conversion_scenario_live_and_reconstructed() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = duckdb_ledger(&temp_dir, 50);
    let id = open_account(&ledger, &[(Currency::Usd, "100")]);

    ledger.transaction_service.deposit(id, Currency::Gbp, dec("50")).unwrap();
    ledger
        .exchange_rate_service
        .update_rate(Currency::Gbp, Currency::Usd, dec("1.3"))
        .unwrap();
    let conversion = ledger
        .transaction_service
        .convert(id, Currency::Gbp, Currency::Usd, dec("50"))
        .unwrap();

    let expected = balances(&[
        (Currency::Usd, "165.00"),
        (Currency::Eur, "0"),
        (Currency::Gbp, "0"),
    ]);
    assert_eq!(ledger.account_service.get_balance(id).unwrap(), expected);
    assert_eq!(
        ledger
            .reconstruction_service
            .reconstruct(id, conversion.timestamp)
            .unwrap()
            .balances,
        expected
    );
}

// ============================================================================
// Exchange Rate Registry
// ============================================================================

#[test]
fn test_reciprocal_is_rounded_to_cents() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = duckdb_ledger(&temp_dir, 50);

    ledger
        .exchange_rate_service
        .update_rate(Currency::Usd, Currency::Eur, dec("1.10"))
        .unwrap();

    let reverse = ledger
        .exchange_rate_service
        .get_latest_rate(Currency::Eur, Currency::Usd)
        .unwrap();
    assert_eq!(reverse.rate, dec("0.91"));
}

#[test]
fn test_old_conversions_ignore_later_rate_updates() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = duckdb_ledger(&temp_dir, 50);
    let id = open_account(&ledger, &[(Currency::Gbp, "50")]);

    let first = ledger
        .exchange_rate_service
        .update_rate(Currency::Gbp, Currency::Usd, dec("1.3"))
        .unwrap()
        .unwrap();
    let conversion = ledger
        .transaction_service
        .convert(id, Currency::Gbp, Currency::Usd, dec("20"))
        .unwrap();
    ledger
        .exchange_rate_service
        .update_rate(Currency::Gbp, Currency::Usd, dec("2.0"))
        .unwrap();

    let then = ledger
        .reconstruction_service
        .reconstruct(id, conversion.timestamp)
        .unwrap();
    assert_eq!(then.balances.get(Currency::Usd), dec("26.00"));

    // rate lookups at a past instant see the rate in force then
    let historic = ledger
        .exchange_rate_service
        .get_rate_at(Currency::Gbp, Currency::Usd, conversion.timestamp)
        .unwrap();
    assert_eq!(historic.id, first.forward.id);
    assert_eq!(historic.rate, dec("1.30"));

    let valuation = ledger
        .reconstruction_service
        .value_at(id, conversion.timestamp, Currency::Usd)
        .unwrap();
    // 30 GBP at 1.3 plus 26 USD
    assert_eq!(valuation.total, dec("65.00"));

    let current = ledger
        .exchange_rate_service
        .get_latest_rate(Currency::Gbp, Currency::Usd)
        .unwrap();
    assert_eq!(current.rate, dec("2.00"));
}

#[test]
fn test_value_at_without_rate_fails() {
    let ledger = memory_ledger(50);
    let id = open_account(&ledger, &[(Currency::Usd, "10"), (Currency::Eur, "5")]);

    let err = ledger
        .reconstruction_service
        .value_at(id, Utc::now() + Duration::seconds(1), Currency::Usd)
        .unwrap_err();
    assert!(matches!(err, Error::NoExchangeRate { from: Currency::Eur, to: Currency::Usd }));
}

// ============================================================================
// Reconstruction Engine
// ============================================================================

#[test]
fn test_reconstruction_matches_live_balance_for_history_lengths() {
    for n in [0usize, 1, 49, 50, 51, 150] {
        let temp_dir = TempDir::new().unwrap();
        let ledger = duckdb_ledger(&temp_dir, 50);
        let id = open_account(&ledger, &[(Currency::Usd, "100")]);
        let created_at = ledger.account_service.get_account(id).unwrap().created_at;

        let at = run_mixed_history(&ledger, id, n).unwrap_or(created_at);
        let live = ledger.account_service.get_balance(id).unwrap();
        let point = ledger.reconstruction_service.reconstruct(id, at).unwrap();

        assert_eq!(point.balances, live, "history length {}", n);
        assert_eq!(snapshot_count(&ledger, id), n / 50, "history length {}", n);
        assert!(point.replayed <= 50, "history length {}", n);
    }
}

#[test]
fn test_memory_and_duckdb_agree() {
    let temp_dir = TempDir::new().unwrap();
    let on_disk = duckdb_ledger(&temp_dir, 10);
    let in_memory = memory_ledger(10);

    for ledger in [&on_disk, &in_memory] {
        let id = open_account(ledger, &[(Currency::Usd, "100")]);
        let at = run_mixed_history(ledger, id, 35).unwrap();
        let point = ledger.reconstruction_service.reconstruct(id, at).unwrap();
        assert_eq!(point.balances, ledger.account_service.get_balance(id).unwrap());
    }

    assert_eq!(
        on_disk.account_service.get_balance(1).unwrap(),
        in_memory.account_service.get_balance(1).unwrap()
    );
}

#[test]
fn test_reconstruction_is_idempotent() {
    let ledger = memory_ledger(5);
    let id = open_account(&ledger, &[(Currency::Usd, "100")]);
    let at = run_mixed_history(&ledger, id, 17).unwrap();

    let first = ledger.reconstruction_service.reconstruct(id, at).unwrap();
    let second = ledger.reconstruction_service.reconstruct(id, at).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_reconstruct_intermediate_points() {
    let ledger = memory_ledger(3);
    let id = open_account(&ledger, &[(Currency::Usd, "10")]);

    let mut checkpoints = vec![];
    for i in 1..=7 {
        let entry = ledger.transaction_service.deposit(id, Currency::Usd, dec("1")).unwrap();
        checkpoints.push((entry.timestamp, Decimal::from(10 + i)));
    }

    for (at, expected) in checkpoints {
        let point = ledger.reconstruction_service.reconstruct(id, at).unwrap();
        assert_eq!(point.balances.get(Currency::Usd), expected);
    }
    assert_eq!(snapshot_count(&ledger, id), 2);
}

#[test]
fn test_reconstruct_before_creation_and_unknown_account() {
    let ledger = memory_ledger(50);
    let id = open_account(&ledger, &[(Currency::Usd, "100")]);
    let created_at = ledger.account_service.get_account(id).unwrap().created_at;

    let err = ledger
        .reconstruction_service
        .reconstruct(id, created_at - Duration::microseconds(1))
        .unwrap_err();
    assert!(matches!(err, Error::NoHistory { account, .. } if account == id));

    // at creation the opening balances hold
    let opening = ledger.reconstruction_service.reconstruct(id, created_at).unwrap();
    assert_eq!(opening.balances.get(Currency::Usd), dec("100"));
    assert_eq!(opening.base_source, SnapshotSource::Opening);

    assert!(matches!(
        ledger.reconstruction_service.reconstruct(999, Utc::now()),
        Err(Error::InvalidAccount { id: 999, .. })
    ));
}

#[test]
fn test_transfer_counts_toward_both_snapshot_cadences() {
    let ledger = memory_ledger(2);
    let a = open_account(&ledger, &[(Currency::Usd, "100")]);
    let b = open_account(&ledger, &[]);

    ledger.transaction_service.deposit(b, Currency::Usd, dec("1")).unwrap();
    ledger.transaction_service.transfer(a, b, Currency::Usd, None, dec("5")).unwrap();

    assert_eq!(snapshot_count(&ledger, a), 0);
    assert_eq!(snapshot_count(&ledger, b), 1);
    let snapshot = &ledger.snapshot_service.list_snapshots(b).unwrap()[0];
    assert_eq!(snapshot.balances.get(Currency::Usd), dec("6"));
}

#[test]
fn test_ledger_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let (id, at, live) = {
        let ledger = duckdb_ledger(&temp_dir, 7);
        let id = open_account(&ledger, &[(Currency::Usd, "100")]);
        let at = run_mixed_history(&ledger, id, 20).unwrap();
        (id, at, ledger.account_service.get_balance(id).unwrap())
    };

    let ledger = duckdb_ledger(&temp_dir, 7);
    assert_eq!(ledger.account_service.get_balance(id).unwrap(), live);
    assert_eq!(ledger.reconstruction_service.reconstruct(id, at).unwrap().balances, live);

    let next = ledger.transaction_service.deposit(id, Currency::Usd, dec("1")).unwrap();
    assert!(next.timestamp > at);
}

#[test]
fn test_doctor_passes_on_engine_written_ledger() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = duckdb_ledger(&temp_dir, 4);
    let a = open_account(&ledger, &[(Currency::Usd, "100")]);
    let b = open_account(&ledger, &[(Currency::Eur, "10")]);
    run_mixed_history(&ledger, a, 13);
    ledger.exchange_rate_service.seed_default_rates().unwrap();
    ledger.transaction_service.transfer(a, b, Currency::Usd, Some(Currency::Gbp), dec("3")).unwrap();
    ledger.snapshot_service.force_snapshot(b).unwrap();

    let result = ledger.doctor_service.run_checks().unwrap();
    assert_eq!(result.summary.errors, 0, "{:?}", result.checks);
    assert_eq!(result.summary.warnings, 0, "{:?}", result.checks);
}

// ============================================================================
// Snapshot independence
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Deposit(Currency, i64),
    Withdraw(Currency, i64),
    Convert(Currency, Currency, i64),
    Transfer(Currency, Option<Currency>, i64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    let currency = prop::sample::select(Currency::ALL.to_vec());
    prop_oneof![
        (currency.clone(), 1i64..5_000).prop_map(|(c, a)| Op::Deposit(c, a)),
        (currency.clone(), 1i64..3_000).prop_map(|(c, a)| Op::Withdraw(c, a)),
        (currency.clone(), currency.clone(), 1i64..3_000).prop_map(|(f, t, a)| Op::Convert(f, t, a)),
        (currency.clone(), prop::option::of(currency), 1i64..3_000)
            .prop_map(|(f, t, a)| Op::Transfer(f, t, a)),
    ]
}

/// Apply `ops` to a fresh ledger; returns the account and the commit
/// timestamps of accepted operations
fn run_ops(ledger: &LedgerContext, ops: &[Op]) -> (AccountId, Vec<DateTime<Utc>>) {
    let a = open_account(ledger, &[(Currency::Usd, "50"), (Currency::Eur, "20")]);
    let b = open_account(ledger, &[(Currency::Gbp, "30")]);
    ledger.exchange_rate_service.seed_default_rates().unwrap();

    let engine = &ledger.transaction_service;
    let mut stamps = vec![];
    for op in ops {
        let result = match op {
            Op::Deposit(c, cents) => engine.deposit(a, *c, Decimal::new(*cents, 2)),
            Op::Withdraw(c, cents) => engine.withdraw(a, *c, Decimal::new(*cents, 2)),
            Op::Convert(f, t, cents) => engine.convert(a, *f, *t, Decimal::new(*cents, 2)),
            Op::Transfer(f, t, cents) => engine.transfer(b, a, *f, *t, Decimal::new(*cents, 2)),
        };
        if let Ok(entry) = result {
            stamps.push(entry.timestamp);
        }
    }
    (a, stamps)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_snapshot_cadence_does_not_change_reconstruction(
        ops in prop::collection::vec(arb_op(), 0..120),
    ) {
        let dense = memory_ledger(10);
        let sparse = memory_ledger(50);

        let (a_dense, dense_stamps) = run_ops(&dense, &ops);
        let (a_sparse, sparse_stamps) = run_ops(&sparse, &ops);
        prop_assert_eq!(dense_stamps.len(), sparse_stamps.len());

        for (d, s) in dense_stamps.iter().zip(&sparse_stamps) {
            let at_dense = dense.reconstruction_service.reconstruct(a_dense, *d).unwrap();
            let at_sparse = sparse.reconstruction_service.reconstruct(a_sparse, *s).unwrap();
            prop_assert_eq!(at_dense.balances, at_sparse.balances);
        }

        prop_assert_eq!(
            dense.account_service.get_balance(a_dense).unwrap(),
            sparse.account_service.get_balance(a_sparse).unwrap()
        );
    }
}
