//! Doctor command - run ledger integrity checks

use anyhow::{bail, Result};
use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde_json::Value;

use fxledger_core::services::CheckStatus;

use super::{finish, get_context};

/// Strings without their JSON quotes
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

/// Format a detail JSON value for display
fn format_detail(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                Value::Object(inner) => format!(
                    "{}: {{{}}}",
                    k,
                    inner
                        .iter()
                        .map(|(c, a)| format!("{} {}", c, plain(a)))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                _ => format!("{}: {}", k, plain(v)),
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => plain(value),
    }
}

pub fn run(verbose: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.doctor_service.run_checks();
    let errors = result.as_ref().map(|r| r.summary.errors).unwrap_or(0);

    finish("doctor", json, result, |result| {
        println!("{}", "Ledger Health Check".bold());
        println!();

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Check", "Status", "Message"]);

        for (check_name, check_result) in &result.checks {
            let status_cell = match check_result.status {
                CheckStatus::Pass => Cell::new("PASS").fg(Color::Green),
                CheckStatus::Warning => Cell::new("WARN").fg(Color::Yellow),
                CheckStatus::Error => Cell::new("ERROR").fg(Color::Red),
            };

            table.add_row(vec![
                Cell::new(check_name),
                status_cell,
                Cell::new(&check_result.message),
            ]);

            if verbose {
                if let Some(details) = &check_result.details {
                    for detail in details {
                        table.add_row(vec![
                            Cell::new(""),
                            Cell::new(""),
                            Cell::new(format!("  - {}", format_detail(detail))),
                        ]);
                    }
                }
            }
        }

        println!("{}", table);
        println!();

        println!(
            "Summary: {} passed, {} warnings, {} errors",
            result.summary.passed.to_string().green(),
            result.summary.warnings.to_string().yellow(),
            result.summary.errors.to_string().red(),
        );
    })?;

    if errors > 0 {
        bail!("{} integrity check(s) failed", errors);
    }
    Ok(())
}
