//! Logs command - what past syncs did and why they failed

use anyhow::{bail, Result};
use chrono::{Duration, TimeZone, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use ibank_core::services::{LogEntry, LogFilter, LoggingService};
use ibank_core::{AccountKey, BankKind};

use super::get_ibank_dir;
use crate::output;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent events, newest first
    List {
        #[command(flatten)]
        scope: Scope,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only failed syncs and checkpoint write failures
        #[arg(long)]
        failures: bool,
        #[arg(long)]
        json: bool,
    },
    /// Delete events older than N days
    Clear {
        #[arg(long, default_value = "30")]
        older_than_days: i64,
        #[arg(long, short)]
        force: bool,
    },
    /// Event and failure counts per bank
    Stats {
        #[arg(long)]
        json: bool,
    },
}

/// Narrow the log down to one bank or one account
#[derive(Args, Debug)]
pub struct Scope {
    /// Bank: fio or citibank
    #[arg(short, long)]
    bank: Option<BankKind>,
    /// Account number within --bank
    #[arg(short, long, requires = "bank")]
    account: Option<u32>,
}

impl Scope {
    fn filter(&self, failures: bool) -> Result<LogFilter> {
        let account = match (self.bank, self.account) {
            (Some(bank), Some(index)) => Some(AccountKey::new(bank, index).to_string()),
            (None, Some(_)) => bail!("--account needs --bank"),
            _ => None,
        };
        Ok(LogFilter {
            bank: self.bank.map(|b| b.as_str().to_string()),
            account,
            errors_only: failures,
        })
    }
}

fn open_log() -> Result<LoggingService> {
    LoggingService::new(&get_ibank_dir()?, env!("CARGO_PKG_VERSION"))
}

fn local_time(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// `fetch (3x)` for a failed sync, blank for everything else
fn failure_column(entry: &LogEntry) -> String {
    match (entry.detail("stage"), entry.detail("attempts")) {
        (Some(stage), Some(attempts)) => format!("{} ({}x)", stage, attempts),
        (Some(stage), None) => stage.to_string(),
        _ => String::new(),
    }
}

pub fn run(command: LogsCommands) -> Result<()> {
    let log = open_log()?;

    match command {
        LogsCommands::List {
            scope,
            limit,
            failures,
            json,
        } => list(&log, &scope.filter(failures)?, limit, json),
        LogsCommands::Clear {
            older_than_days,
            force,
        } => clear(&log, older_than_days, force),
        LogsCommands::Stats { json } => stats(&log, json),
    }
}

fn list(log: &LoggingService, filter: &LogFilter, limit: usize, json: bool) -> Result<()> {
    let entries = log.entries(filter, limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        output::info("Nothing logged yet");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Account", "Event", "Failed at", "Error"]);
    for entry in &entries {
        let error = entry
            .error_message
            .as_deref()
            .map(|e| e.red().to_string())
            .unwrap_or_default();
        table.add_row(vec![
            local_time(entry.timestamp),
            entry.account.clone().or_else(|| entry.bank.clone()).unwrap_or_default(),
            entry.event.clone(),
            failure_column(entry),
            error,
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn clear(log: &LoggingService, older_than_days: i64, force: bool) -> Result<()> {
    let cutoff = Utc::now() - Duration::days(older_than_days);
    let confirmed = force
        || Confirm::new()
            .with_prompt(format!("Delete events logged before {}?", cutoff.format("%Y-%m-%d")))
            .default(false)
            .interact()?;
    if !confirmed {
        output::info("Cancelled");
        return Ok(());
    }

    let deleted = log.delete_before(cutoff.timestamp_millis())?;
    output::success(&format!("Deleted {} event(s)", deleted));
    Ok(())
}

fn stats(log: &LoggingService, json: bool) -> Result<()> {
    let mut rows = Vec::new();
    for bank in [BankKind::Fio, BankKind::CitibankCz] {
        let all = LogFilter {
            bank: Some(bank.as_str().to_string()),
            ..Default::default()
        };
        let failed = LogFilter {
            errors_only: true,
            ..all.clone()
        };
        let last_failure = log.entries(&failed, 1)?.into_iter().next();
        rows.push((bank, log.count(&all)?, log.count(&failed)?, last_failure));
    }

    if json {
        let banks: Vec<_> = rows
            .iter()
            .map(|(bank, events, failures, last)| {
                serde_json::json!({
                    "bank": bank.as_str(),
                    "events": events,
                    "failures": failures,
                    "lastFailure": last.as_ref().map(|e| e.timestamp),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "database": log.db_path(),
                "banks": banks,
            }))?
        );
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Bank", "Events", "Failures", "Last failure"]);
    for (bank, events, failures, last) in rows {
        let last = last
            .map(|e| format!("{} {}", local_time(e.timestamp), failure_column(&e)))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![bank.to_string(), events.to_string(), failures.to_string(), last]);
    }
    println!("{}", table);
    println!("{}", format!("Event log: {}", log.db_path().display()).dimmed());
    Ok(())
}
