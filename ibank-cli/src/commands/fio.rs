//! Fio commands - transactions and statements over the Fio REST API

use anyhow::Result;
use chrono::NaiveDate;
use clap::Subcommand;

use super::bank::{self, OutputArgs};
use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum FioCommands {
    /// Download transactions since the last sync, or for a date range
    Transactions {
        /// API token (defaults to fio.tokens[account] from settings)
        #[arg(long, env = "IBANK_FIO_TOKEN", hide_env_values = true)]
        token: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
        /// First day (YYYY-MM-DD)
        from: Option<NaiveDate>,
        /// Day after the last one (YYYY-MM-DD), defaults to today
        to: Option<NaiveDate>,
    },
    /// Download a statement
    Statement {
        /// API token (defaults to fio.tokens[account] from settings)
        #[arg(long, env = "IBANK_FIO_TOKEN", hide_env_values = true)]
        token: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
        /// Statement year
        year: i32,
        /// Statement number within the year
        period: u32,
    },
}

pub fn run(command: FioCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        FioCommands::Transactions {
            token,
            output,
            from,
            to,
        } => {
            let adapter = ctx.fio_adapter(output.account, token.as_deref())?;
            let spinner = output::spinner("Connecting to Fio");
            bank::run_transactions(&ctx, &adapter, &output, from, to, &spinner)
        }
        FioCommands::Statement {
            token,
            output,
            year,
            period,
        } => {
            let adapter = ctx.fio_adapter(output.account, token.as_deref())?;
            let spinner = output::spinner("Connecting to Fio");
            bank::run_statement(&ctx, &adapter, &output, year, period, &spinner)
        }
    }
}
