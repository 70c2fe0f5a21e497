//! Create-account command - open an account with opening balances

use anyhow::Result;
use rust_decimal::Decimal;

use fxledger_core::Currency;

use super::{finish, get_context};
use crate::output;

pub fn run(initial: &[(Currency, Decimal)], json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.account_service.create_account(initial);
    finish("create-account", json, result, |account| {
        output::success(&format!("Created account {}", account.id));
        println!("{}", output::balances_table(&account.balances));
    })
}
