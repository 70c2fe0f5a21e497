//! Rate commands - record, look up and list exchange rates

use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::Cell;
use rust_decimal::Decimal;

use fxledger_core::{Currency, ExchangeRate};

use super::{finish, get_context};
use crate::output;

fn rates_table(rates: &[ExchangeRate]) -> comfy_table::Table {
    let mut table = output::create_table();
    table.set_header(vec!["ID", "Pair", "Rate", "Recorded"]);
    for rate in rates {
        table.add_row(vec![
            Cell::new(rate.id),
            Cell::new(format!("{} -> {}", rate.from_currency, rate.to_currency)),
            Cell::new(output::format_amount(rate.rate)),
            Cell::new(output::format_timestamp(&rate.timestamp)),
        ]);
    }
    table
}

pub fn run_update(from: Currency, to: Currency, rate: Decimal, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.exchange_rate_service.update_rate(from, to, rate);
    finish("update-rate", json, result, |update| match update {
        Some(update) => {
            output::success(&format!("Updated {} -> {}", from, to));
            println!(
                "{}",
                rates_table(&[update.forward.clone(), update.reverse.clone()])
            );
        }
        None => output::warning("Same currency on both sides; nothing recorded"),
    })
}

pub fn run_show(from: Currency, to: Currency, at: Option<DateTime<Utc>>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = match at {
        Some(at) => ctx.exchange_rate_service.get_rate_at(from, to, at),
        None => ctx.exchange_rate_service.get_latest_rate(from, to),
    };
    finish("rate", json, result, |rate| {
        println!(
            "1 {} = {} {} (recorded {})",
            from,
            output::format_amount(rate.rate),
            to,
            output::format_timestamp(&rate.timestamp)
        );
    })
}

pub fn run_history(from: Currency, to: Currency, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.exchange_rate_service.rate_history(from, to);
    finish("rate", json, result, |rates| {
        if rates.is_empty() {
            output::warning(&format!("No {} -> {} rates recorded.", from, to));
        } else {
            println!("{}", rates_table(rates));
        }
    })
}

pub fn run_list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.exchange_rate_service.list_latest_rates();
    finish("rates", json, result, |rates| {
        if rates.is_empty() {
            output::warning("No exchange rates recorded. Run `fxl seed-rates` or `fxl update-rate`.");
        } else {
            println!("{}", rates_table(rates));
        }
    })
}

pub fn run_seed(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.exchange_rate_service.seed_default_rates();
    finish("seed-rates", json, result, |updates| {
        output::success(&format!("Seeded {} currency pair(s)", updates.len()));
        let rows: Vec<ExchangeRate> = updates
            .iter()
            .flat_map(|u| [u.forward.clone(), u.reverse.clone()])
            .collect();
        println!("{}", rates_table(&rows));
    })
}
