//! Snapshot command - write or list balance snapshots

use anyhow::Result;
use comfy_table::Cell;

use fxledger_core::AccountId;

use super::{finish, get_context};
use crate::output;

pub fn run(account_id: AccountId, list: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;

    if !list {
        let result = ctx.snapshot_service.force_snapshot(account_id);
        return finish("snapshot", json, result, |snapshot| {
            output::success(&format!(
                "Snapshot of account {} written at {}",
                account_id,
                output::format_timestamp(&snapshot.timestamp)
            ));
            println!("{}", output::balances_table(&snapshot.balances));
        });
    }

    let result = ctx.snapshot_service.list_snapshots(account_id);
    finish("snapshot", json, result, |snapshots| {
        if snapshots.is_empty() {
            println!("No snapshots for account {}.", account_id);
            return;
        }
        let mut table = output::create_table();
        table.set_header(vec!["ID", "Time", "Source", "Balances"]);
        for snapshot in snapshots {
            let balances = snapshot
                .balances
                .iter()
                .map(|(c, a)| format!("{} {}", output::format_amount(a), c))
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(vec![
                Cell::new(snapshot.id.map(|id| id.to_string()).unwrap_or_default()),
                Cell::new(output::format_timestamp(&snapshot.timestamp)),
                Cell::new(snapshot.source.as_str()),
                Cell::new(balances),
            ]);
        }
        println!("{}", table);
    })
}
