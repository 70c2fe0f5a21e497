//! Convert command - exchange between currencies inside one account

use anyhow::Result;
use rust_decimal::Decimal;

use fxledger_core::{AccountId, Currency};

use super::{finish, get_context};
use crate::output;

pub fn run(
    account_id: AccountId,
    from_currency: Currency,
    to_currency: Currency,
    amount: Decimal,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx
        .transaction_service
        .convert(account_id, from_currency, to_currency, amount);
    finish("convert", json, result, output::print_committed)
}
