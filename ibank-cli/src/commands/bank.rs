//! Plumbing shared by the bank commands: output format, running the sync
//! service and writing what it produced

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use colored::Colorize;
use ibank_core::services::LogEvent;
use ibank_core::{
    serializer_for, AccountKey, BankAdapter, BankKind, DateRange, IbankContext, OutputFormat,
};
use indicatif::ProgressBar;

use super::log_event;
use crate::output;

/// Options every bank command takes
#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Account number (0-based)
    #[arg(short, long, default_value = "0")]
    pub account: u32,
    /// Output format: csv, tsv (xls), json, ofx, qif, pdf
    #[arg(short, long)]
    pub format: Option<String>,
    /// Output file, `-` for stdout
    #[arg(short = 'o', long = "output-file")]
    pub output_file: Option<PathBuf>,
}

impl OutputArgs {
    /// `--format`, else `app.defaultFormat` from settings
    pub fn format(&self, ctx: &IbankContext) -> Result<OutputFormat> {
        self.resolve_format(None, ctx.config.default_format)
    }

    /// `--format`, else the bank's own statement format, else `app.defaultFormat`
    pub fn statement_format(&self, ctx: &IbankContext, adapter: &dyn BankAdapter) -> Result<OutputFormat> {
        self.resolve_format(adapter.statement_format(), ctx.config.default_format)
    }

    fn resolve_format(&self, preferred: Option<OutputFormat>, configured: OutputFormat) -> Result<OutputFormat> {
        match &self.format {
            Some(name) => Ok(name.parse()?),
            None => Ok(preferred.unwrap_or(configured)),
        }
    }

    fn sink(&self, default_name: String) -> Sink {
        match &self.output_file {
            Some(path) if path.as_os_str() == "-" => Sink::Stdout,
            Some(path) => Sink::File(path.clone()),
            None => Sink::File(PathBuf::from(default_name)),
        }
    }
}

/// Where serialized output goes
#[derive(Debug, PartialEq)]
enum Sink {
    Stdout,
    File(PathBuf),
}

impl Sink {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        match self {
            Sink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(bytes)?;
                stdout.flush()?;
            }
            Sink::File(path) => {
                std::fs::write(path, bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// Progress lines go to stderr when the data itself goes to stdout
    fn report(&self, msg: &str) {
        match self {
            Sink::Stdout => eprintln!("{}", msg),
            Sink::File(_) => println!("{}", msg),
        }
    }
}

/// `fio_transactions.csv`, or `fio_transactions_2013-09-01_2013-09-30.csv` for an
/// explicit range; the second date is the last day included
fn transactions_file_name(bank: BankKind, format: OutputFormat, explicit: Option<&DateRange>) -> String {
    match explicit {
        Some(range) => format!(
            "{}_transactions_{}_{}.{}",
            bank.file_prefix(),
            range.start(),
            range.last_day().unwrap_or(range.start()),
            format.extension()
        ),
        None => format!("{}_transactions.{}", bank.file_prefix(), format.extension()),
    }
}

/// `fio_statement_2013_1.pdf`
fn statement_file_name(bank: BankKind, year: i32, period: u32, format: OutputFormat) -> String {
    format!(
        "{}_statement_{}_{}.{}",
        bank.file_prefix(),
        year,
        period,
        format.extension()
    )
}

fn log_command(ctx: &IbankContext, account: &AccountKey, command: &str) {
    log_event(
        ctx.logger.as_deref(),
        LogEvent::new("command_executed")
            .with_command(command)
            .with_bank(account.bank_kind.as_str())
            .with_account(account.to_string()),
    );
}

/// Fetch transactions through the sync service and write them out
pub fn run_transactions(
    ctx: &IbankContext,
    adapter: &dyn BankAdapter,
    args: &OutputArgs,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    spinner: &ProgressBar,
) -> Result<()> {
    let format = args.format(ctx)?;
    let account = AccountKey::new(adapter.kind(), args.account);
    log_command(ctx, &account, &format!("{} transactions", adapter.kind().file_prefix()));

    let serializer = serializer_for(format);
    spinner.set_message(format!("Fetching transactions of {}", account));
    let result = ctx
        .sync_service
        .sync_transactions(&account, adapter, from, to, serializer.as_ref());
    spinner.finish_and_clear();
    let report = result?;

    for warning in &report.warnings {
        output::warning(&format!("Warning: {}", warning));
    }

    let explicit = (from.is_some() || to.is_some()).then_some(&report.range);
    let sink = args.sink(transactions_file_name(account.bank_kind, format, explicit));
    sink.write(&report.output)?;

    sink.report(&format!(
        "{} {} transactions of {} in {}",
        "Fetched".green(),
        report.transactions.len(),
        account,
        report.range
    ));
    if let Some(checkpoint) = report.checkpoint {
        sink.report(&format!("  Next sync starts at {}", checkpoint));
    }
    if let Sink::File(path) = &sink {
        sink.report(&format!(
            "  Written to {} ({})",
            path.display(),
            output::format_size(report.output.len() as u64)
        ));
    }

    Ok(())
}

/// Fetch one statement and write it out; checkpoints are left alone
pub fn run_statement(
    ctx: &IbankContext,
    adapter: &dyn BankAdapter,
    args: &OutputArgs,
    year: i32,
    period: u32,
    spinner: &ProgressBar,
) -> Result<()> {
    let format = args.statement_format(ctx, adapter)?;
    let account = AccountKey::new(adapter.kind(), args.account);
    log_command(ctx, &account, &format!("{} statement", adapter.kind().file_prefix()));

    let serializer = serializer_for(format);
    spinner.set_message(format!("Fetching statement {}/{} of {}", period, year, account));
    let result = ctx
        .sync_service
        .fetch_statement(&account, adapter, year, period, serializer.as_ref());
    spinner.finish_and_clear();
    let report = result?;

    let sink = args.sink(statement_file_name(account.bank_kind, year, period, format));
    sink.write(&report.output)?;

    sink.report(&format!(
        "{} statement {}/{} of {}",
        "Fetched".green(),
        report.period,
        report.year,
        account
    ));
    if let (Some(opening), Some(closing)) = (
        report.statement.opening_balance,
        report.statement.closing_balance,
    ) {
        sink.report(&format!("  Balance {} -> {}", opening, closing));
    }
    if let Sink::File(path) = &sink {
        sink.report(&format!(
            "  Written to {} ({})",
            path.display(),
            output::format_size(report.output.len() as u64)
        ));
    }

    Ok(())
}
