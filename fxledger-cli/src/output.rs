//! Output formatting utilities

use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};
use rust_decimal::Decimal;

use fxledger_core::{Balances, Transaction};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Amount with exactly two decimals
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn amount_cell(amount: Decimal) -> Cell {
    Cell::new(format_amount(amount)).set_alignment(CellAlignment::Right)
}

/// One row per currency
pub fn balances_table(balances: &Balances) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Currency", "Balance"]);
    for (currency, amount) in balances.iter() {
        table.add_row(vec![Cell::new(currency), amount_cell(amount)]);
    }
    table
}

pub fn transactions_table(entries: &[Transaction]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Time", "Type", "From", "To", "Amount", "Rate", "Credited"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.id),
            Cell::new(format_timestamp(&entry.timestamp)),
            Cell::new(entry.kind),
            Cell::new(entry.from_account),
            Cell::new(entry.to_account),
            Cell::new(format!("{} {}", format_amount(entry.amount), entry.from_currency))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_amount(entry.rate)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} {}", format_amount(entry.credited_amount()), entry.to_currency))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Print a committed ledger entry
pub fn print_committed(entry: &Transaction) {
    success(&format!("{} #{} committed", entry.kind, entry.id));
    println!("{}", transactions_table(std::slice::from_ref(entry)));
}
