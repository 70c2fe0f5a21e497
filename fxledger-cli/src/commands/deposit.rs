//! Deposit command - add money to an account

use anyhow::Result;
use rust_decimal::Decimal;

use fxledger_core::{AccountId, Currency};

use super::{finish, get_context};
use crate::output;

pub fn run(account_id: AccountId, currency: Currency, amount: Decimal, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.transaction_service.deposit(account_id, currency, amount);
    finish("deposit", json, result, output::print_committed)
}
