//! Transfer command - move money between two accounts

use anyhow::Result;
use rust_decimal::Decimal;

use fxledger_core::{AccountId, Currency};

use super::{finish, get_context};
use crate::output;

pub fn run(
    from_account: AccountId,
    to_account: AccountId,
    currency: Currency,
    to_currency: Option<Currency>,
    amount: Decimal,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx
        .transaction_service
        .transfer(from_account, to_account, currency, to_currency, amount);
    finish("transfer", json, result, output::print_committed)
}
