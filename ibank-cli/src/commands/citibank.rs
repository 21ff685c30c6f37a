//! Citibank commands - transactions and statements through web banking
//!
//! A session saved by an earlier run is tried first. Only if the bank no
//! longer honours it are the password and SMS code asked for, with the
//! spinner suspended while the user types.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Subcommand;
use dialoguer::{Input, Password};
use ibank_core::adapters::citibank::{CitibankCzAdapter, SecretPrompt};
use ibank_core::{Error, IbankContext};
use indicatif::ProgressBar;

use super::bank::{self, OutputArgs};
use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum CitibankCommands {
    /// Download transactions since the last sync, or for a date range
    Transactions {
        /// Login name (defaults to citibank.username from settings)
        #[arg(long)]
        username: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
        /// First day (YYYY-MM-DD)
        from: Option<NaiveDate>,
        /// Day after the last one (YYYY-MM-DD), defaults to today
        to: Option<NaiveDate>,
    },
    /// Download a monthly statement (PDF)
    Statement {
        /// Login name (defaults to citibank.username from settings)
        #[arg(long)]
        username: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
        /// Statement year
        year: i32,
        /// Statement month (1-12)
        period: u32,
    },
}

fn password_prompt(spinner: ProgressBar) -> SecretPrompt {
    Box::new(move || {
        spinner.suspend(|| {
            Password::new()
                .with_prompt("Citibank password")
                .interact()
                .map_err(|e| Error::auth(format!("Password not entered: {}", e)))
        })
    })
}

fn sms_prompt(spinner: ProgressBar) -> SecretPrompt {
    Box::new(move || {
        spinner.suspend(|| {
            Input::<String>::new()
                .with_prompt("SMS code")
                .interact_text()
                .map_err(|e| Error::auth(format!("SMS code not entered: {}", e)))
        })
    })
}

/// Build the adapter with a spinner the sign-on prompts can suspend
fn adapter(
    ctx: &IbankContext,
    username: Option<&str>,
    account: u32,
) -> Result<(CitibankCzAdapter, ProgressBar)> {
    let spinner = output::spinner("Signing on to Citibank");
    let password = password_prompt(spinner.clone());
    match ctx.citibank_adapter(account, username, password, sms_prompt(spinner.clone())) {
        Ok(adapter) => Ok((adapter, spinner)),
        Err(e) => {
            spinner.finish_and_clear();
            Err(e)
        }
    }
}

pub fn run(command: CitibankCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        CitibankCommands::Transactions {
            username,
            output,
            from,
            to,
        } => {
            let (adapter, spinner) = adapter(&ctx, username.as_deref(), output.account)?;
            bank::run_transactions(&ctx, &adapter, &output, from, to, &spinner)
        }
        CitibankCommands::Statement {
            username,
            output,
            year,
            period,
        } => {
            let (adapter, spinner) = adapter(&ctx, username.as_deref(), output.account)?;
            bank::run_statement(&ctx, &adapter, &output, year, period, &spinner)
        }
    }
}
