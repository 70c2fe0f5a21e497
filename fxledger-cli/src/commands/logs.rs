//! Logs command - view and manage the command event log

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use dialoguer::Confirm;

use fxledger_core::LoggingService;

use super::get_ledger_dir;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only failures
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear old log entries
    Clear {
        /// Delete logs older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Delete every entry regardless of age
        #[arg(long)]
        all: bool,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show log statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn get_logging_service() -> Result<LoggingService> {
    let ledger_dir = get_ledger_dir()?;
    std::fs::create_dir_all(&ledger_dir)?;
    Ok(LoggingService::new(&ledger_dir, env!("CARGO_PKG_VERSION"))?)
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(command: LogsCommands) -> Result<()> {
    match command {
        LogsCommands::List { limit, errors, json } => {
            let service = get_logging_service()?;
            let entries = if errors {
                service.get_errors(limit)?
            } else {
                service.get_recent(limit)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No log entries found.");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Time", "Event", "Command", "Error Code", "Version"]);

            for entry in entries {
                let code = entry
                    .error_code
                    .as_deref()
                    .map(|c| c.red().to_string())
                    .unwrap_or_default();
                table.add_row(vec![
                    format_timestamp(entry.timestamp),
                    entry.event,
                    entry.command.unwrap_or_default(),
                    code,
                    entry.app_version,
                ]);
            }

            println!("{}", table);
        }
        LogsCommands::Clear {
            older_than_days,
            all,
            force,
            json,
        } => {
            let service = get_logging_service()?;

            if !force && !json {
                let prompt = if all {
                    "Delete all log entries?".to_string()
                } else {
                    format!("Delete logs older than {} days?", older_than_days)
                };
                if !Confirm::new().with_prompt(prompt).default(false).interact()? {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let deleted = if all {
                service.clear()?
            } else {
                // capped so the cutoff stays representable
                let days = i64::try_from(older_than_days).unwrap_or(i64::MAX).min(365_000);
                let cutoff = Utc::now() - Duration::days(days);
                service.delete_before(cutoff.timestamp_millis())?
            };

            if json {
                println!("{}", serde_json::json!({"deleted": deleted}));
            } else {
                println!("Deleted {} log entries", deleted);
            }
        }
        LogsCommands::Stats { json } => {
            let service = get_logging_service()?;
            let stats = service.stats()?;
            let db_path = service.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "total_entries": stats.total,
                        "error_count": stats.errors,
                        "commands": stats.commands,
                        "error_codes": stats.error_codes,
                        "database_path": db_path.to_string_lossy(),
                        "database_size_bytes": size_bytes
                    })
                );
            } else {
                println!("{}", "Log Statistics".bold());
                println!("  Total entries: {}", stats.total);
                println!("  Errors: {}", stats.errors);
                if !stats.commands.is_empty() {
                    println!("  Commands:");
                }
                for (command, count) in &stats.commands {
                    println!("    {}: {}", command, count);
                }
                if !stats.error_codes.is_empty() {
                    println!("  Error codes:");
                    for (code, count) in &stats.error_codes {
                        println!("    {}: {}", code.red(), count);
                    }
                }
                println!("  Database: {}", db_path.display());
                println!("  Size: {} bytes", size_bytes);
            }
        }
    }

    Ok(())
}
