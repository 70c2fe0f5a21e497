//! Status command - show ledger status and summary

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, ContentArrangement, Table};

use super::{finish, get_context};
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.status_service.get_status();

    finish("status", json, result, |status| {
        println!("{}", "Ledger Status".bold());
        println!();

        let currencies = status
            .currencies
            .iter()
            .map(|c| c.code())
            .collect::<Vec<_>>()
            .join(", ");

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec!["Accounts", &status.total_accounts.to_string()]);
        table.add_row(vec!["Transactions", &status.total_transactions.to_string()]);
        table.add_row(vec!["Balance Snapshots", &status.total_snapshots.to_string()]);
        table.add_row(vec!["Exchange Rate Rows", &status.total_rate_rows.to_string()]);
        table.add_row(vec!["Currencies", &currencies]);
        table.add_row(vec!["Snapshot Interval", &status.snapshot_interval.to_string()]);
        println!("{}", table);

        if let Some(path) = &ctx.db_path {
            println!();
            println!("Database: {}", path.display());
        }

        if status.accounts.is_empty() {
            return;
        }

        println!();
        println!("{}", "Accounts".bold());
        let mut accounts = output::create_table();
        accounts.set_header(vec!["ID", "Opened", "Transactions", "Snapshots", "Last Activity", "Balances"]);
        for account in &status.accounts {
            let balances = account
                .balances
                .iter()
                .filter(|(_, amount)| !amount.is_zero())
                .map(|(c, a)| format!("{} {}", output::format_amount(a), c))
                .collect::<Vec<_>>()
                .join(", ");
            accounts.add_row(vec![
                Cell::new(account.id),
                Cell::new(output::format_timestamp(&account.created_at)),
                Cell::new(account.transactions),
                Cell::new(account.snapshots),
                Cell::new(
                    account
                        .last_activity
                        .as_ref()
                        .map(output::format_timestamp)
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(balances),
            ]);
        }
        println!("{}", accounts);
    })
}
