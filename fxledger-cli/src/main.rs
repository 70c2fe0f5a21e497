//! fxledger CLI - multi-currency ledger in your terminal

use std::process::ExitCode;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use fxledger_core::{AccountId, Currency, TransactionKind};

mod commands;
mod output;
mod validation;

use commands::{
    balance, convert, create_account, deposit, doctor, history, logs, rate, snapshot, status,
    transfer, withdraw,
};

/// fxledger - multi-currency ledger with point-in-time balances
#[derive(Parser)]
#[command(name = "fxl", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new account
    CreateAccount {
        /// Opening balances, e.g. USD=100,EUR=50
        #[arg(long, default_value = "", value_parser = validation::parse_balances)]
        initial_balance: validation::BalanceList,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add money to an account
    Deposit {
        account_id: AccountId,
        currency: Currency,
        #[arg(value_parser = validation::parse_amount)]
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Take money out of an account
    Withdraw {
        account_id: AccountId,
        currency: Currency,
        #[arg(value_parser = validation::parse_amount)]
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move money between accounts, converting when currencies differ
    Transfer {
        from_account: AccountId,
        to_account: AccountId,
        currency: Currency,
        #[arg(value_parser = validation::parse_amount)]
        amount: Decimal,
        /// Currency the receiver is credited in (defaults to the sent currency)
        #[arg(long = "to-currency")]
        to_currency: Option<Currency>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert money between currencies within one account
    Convert {
        account_id: AccountId,
        from_currency: Currency,
        to_currency: Currency,
        #[arg(value_parser = validation::parse_amount)]
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a new exchange rate and its reciprocal
    UpdateRate {
        from_currency: Currency,
        to_currency: Currency,
        #[arg(value_parser = validation::parse_rate)]
        rate: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the rate for a currency pair
    Rate {
        from_currency: Currency,
        to_currency: Currency,
        /// Rate in force at this time instead of the latest
        #[arg(long, value_parser = validation::parse_timestamp, conflicts_with = "history")]
        at: Option<DateTime<Utc>>,
        /// Every rate recorded for the pair, oldest first
        #[arg(long)]
        history: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the latest rate of every pair
    Rates {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record the default starting rates
    SeedRates {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an account's balances
    Balance {
        account_id: AccountId,
        /// Reconstruct balances as of this time
        #[arg(long, value_parser = validation::parse_timestamp)]
        at: Option<DateTime<Utc>>,
        /// Value every balance in this currency
        #[arg(long = "in")]
        in_currency: Option<Currency>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recent transactions of an account
    History {
        account_id: AccountId,
        /// Number of entries to show
        #[arg(short, long, default_value_t = fxledger_core::services::transaction::DEFAULT_HISTORY_LIMIT)]
        limit: usize,
        /// Only show one transaction type (deposit, withdrawal, transfer, conversion)
        #[arg(long = "type")]
        kind: Option<TransactionKind>,
        /// Output format
        #[arg(long, value_enum, default_value_t = history::Format::Table)]
        format: history::Format,
        /// Output as JSON (shorthand for --format json)
        #[arg(long)]
        json: bool,
    },

    /// Write a balance snapshot now, or list existing ones
    Snapshot {
        account_id: AccountId,
        /// List snapshots instead of writing one
        #[arg(long)]
        list: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show ledger status and summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run ledger integrity checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the command event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::CreateAccount { initial_balance, json } => create_account::run(&initial_balance.0, json),
        Commands::Deposit { account_id, currency, amount, json } => {
            deposit::run(account_id, currency, amount, json)
        }
        Commands::Withdraw { account_id, currency, amount, json } => {
            withdraw::run(account_id, currency, amount, json)
        }
        Commands::Transfer { from_account, to_account, currency, amount, to_currency, json } => {
            transfer::run(from_account, to_account, currency, to_currency, amount, json)
        }
        Commands::Convert { account_id, from_currency, to_currency, amount, json } => {
            convert::run(account_id, from_currency, to_currency, amount, json)
        }
        Commands::UpdateRate { from_currency, to_currency, rate, json } => {
            rate::run_update(from_currency, to_currency, rate, json)
        }
        Commands::Rate { from_currency, to_currency, history: true, json, .. } => {
            rate::run_history(from_currency, to_currency, json)
        }
        Commands::Rate { from_currency, to_currency, at, history: false, json } => {
            rate::run_show(from_currency, to_currency, at, json)
        }
        Commands::Rates { json } => rate::run_list(json),
        Commands::SeedRates { json } => rate::run_seed(json),
        Commands::Balance { account_id, at, in_currency, json } => {
            balance::run(account_id, at, in_currency, json)
        }
        Commands::History { account_id, limit, kind, format, json } => {
            let format = if json { history::Format::Json } else { format };
            history::run(account_id, limit, kind, format)
        }
        Commands::Snapshot { account_id, list, json } => snapshot::run(account_id, list, json),
        Commands::Status { json } => status::run(json),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Logs { command } => logs::run(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_history_flag() {
        let cli = Cli::try_parse_from(["fxl", "rate", "USD", "EUR", "--history"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rate { from_currency: Currency::Usd, to_currency: Currency::Eur, history: true, at: None, .. }
        ));

        let cli = Cli::try_parse_from(["fxl", "rate", "USD", "EUR"]).unwrap();
        assert!(matches!(cli.command, Commands::Rate { history: false, .. }));

        assert!(Cli::try_parse_from(["fxl", "rate", "USD", "EUR", "--history", "--at", "2024-01-01"]).is_err());
    }

    #[test]
    fn test_amount_above_storable_range_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["fxl", "deposit", "1", "USD", "10000000000000000"]).is_err());
    }
}
