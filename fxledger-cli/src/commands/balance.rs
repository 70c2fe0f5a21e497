//! Balance command - live, historical or valued balances of an account

use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::Cell;

use fxledger_core::{AccountId, Currency};

use super::{finish, get_context};
use crate::output;

pub fn run(
    account_id: AccountId,
    at: Option<DateTime<Utc>>,
    in_currency: Option<Currency>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;

    if let Some(currency) = in_currency {
        let at = at.unwrap_or_else(Utc::now);
        let result = ctx.reconstruction_service.value_at(account_id, at, currency);
        return finish("balance", json, result, |valuation| {
            let converted_header = format!("In {}", currency);
            let mut table = output::create_table();
            table.set_header(vec!["Currency", "Balance", "Rate", converted_header.as_str()]);
            for line in &valuation.lines {
                table.add_row(vec![
                    Cell::new(line.currency),
                    Cell::new(output::format_amount(line.amount)),
                    Cell::new(output::format_amount(line.rate)),
                    Cell::new(output::format_amount(line.converted)),
                ]);
            }
            println!("{}", table);
            output::success(&format!(
                "Account {} at {}: {} {}",
                account_id,
                output::format_timestamp(&valuation.at),
                output::format_amount(valuation.total),
                currency
            ));
        });
    }

    match at {
        Some(at) => {
            let result = ctx.reconstruction_service.reconstruct(account_id, at);
            finish("balance", json, result, |point| {
                output::info(&format!(
                    "Account {} as of {} ({} entries replayed from {} snapshot at {})",
                    account_id,
                    output::format_timestamp(&point.at),
                    point.replayed,
                    point.base_source.as_str(),
                    output::format_timestamp(&point.base_timestamp)
                ));
                println!("{}", output::balances_table(&point.balances));
            })
        }
        None => {
            let result = ctx.account_service.get_account(account_id);
            finish("balance", json, result, |account| {
                output::info(&format!("Account {}", account.id));
                println!("{}", output::balances_table(&account.balances));
            })
        }
    }
}
