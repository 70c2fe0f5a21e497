//! History command - recent transactions of an account

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use fxledger_core::{AccountId, Transaction, TransactionKind};

use super::{finish, get_context, record};
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
    Csv,
}

/// Flat CSV row; amounts keep two decimals
#[derive(Serialize)]
struct CsvRow {
    id: i64,
    timestamp: String,
    kind: &'static str,
    from_account: AccountId,
    to_account: AccountId,
    from_currency: &'static str,
    to_currency: &'static str,
    amount: String,
    rate: String,
    credited: String,
}

impl From<&Transaction> for CsvRow {
    fn from(entry: &Transaction) -> Self {
        Self {
            id: entry.id,
            timestamp: output::format_timestamp(&entry.timestamp),
            kind: entry.kind.as_str(),
            from_account: entry.from_account,
            to_account: entry.to_account,
            from_currency: entry.from_currency.code(),
            to_currency: entry.to_currency.code(),
            amount: output::format_amount(entry.amount),
            rate: output::format_amount(entry.rate),
            credited: output::format_amount(entry.credited_amount()),
        }
    }
}

fn write_csv(entries: &[Transaction]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for entry in entries {
        writer.serialize(CsvRow::from(entry))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn run(
    account_id: AccountId,
    limit: usize,
    kind: Option<TransactionKind>,
    format: Format,
) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.transaction_service.history(account_id, limit, kind);

    if format == Format::Csv {
        record("history", &result);
        return write_csv(&result?);
    }

    finish("history", format == Format::Json, result, |entries| {
        if entries.is_empty() {
            println!("No transactions for account {}.", account_id);
        } else {
            println!("{}", output::transactions_table(entries));
        }
    })
}
