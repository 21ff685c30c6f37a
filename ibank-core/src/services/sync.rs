//! Sync service - fetch transactions and statements from one bank account
//!
//! A transaction sync runs through these stages:
//! ResolveRange -> Fetch -> UpdateCheckpoint -> Serialize -> Done
//!
//! Any fatal error stops the run as a `SyncFailure` naming the stage. A
//! failed checkpoint write is not fatal: the output is still produced and
//! the report carries a warning.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::domain::result::{Error, Result};
use crate::domain::{AccountKey, DateRange, Statement, Transaction};
use crate::ports::{BankAdapter, CheckpointStore, Clock, FormatSerializer};
use crate::services::logging::{LogEvent, LoggingService};
use crate::services::range;

/// How often and how patiently transient bank failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based): initial_delay * 2^retry
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay
            .checked_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
            .unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Returns the outcome and the attempts made.
    ///
    /// Never waits less than the `retry_after` a rate-limited bank asked for.
    pub fn run<T, F>(&self, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    // A rate-limited bank keeps refusing until its window passes
                    let delay = self
                        .delay_for(attempt - 1)
                        .max(e.retry_after().unwrap_or(Duration::ZERO));
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "bank request failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

/// Stage of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    ResolveRange,
    Fetch,
    UpdateCheckpoint,
    Serialize,
    Done,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::ResolveRange => "resolve range",
            SyncStage::Fetch => "fetch",
            SyncStage::UpdateCheckpoint => "update checkpoint",
            SyncStage::Serialize => "serialize",
            SyncStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A sync run that stopped before producing output
#[derive(Debug, ThisError)]
#[error("{stage} failed after {attempts} attempt(s): {source}")]
pub struct SyncFailure {
    pub stage: SyncStage,
    /// Fetch attempts made before the run stopped
    pub attempts: u32,
    pub source: Error,
}

impl SyncFailure {
    fn new(stage: SyncStage, attempts: u32, source: Error) -> Self {
        Self {
            stage,
            attempts,
            source,
        }
    }
}

/// Outcome of a successful transaction sync
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub account: AccountKey,
    pub range: DateRange,
    /// Sorted by (date, id)
    pub transactions: Vec<Transaction>,
    /// Checkpoint after this run (None if none was ever written)
    pub checkpoint: Option<NaiveDate>,
    #[serde(skip)]
    pub output: Vec<u8>,
    pub warnings: Vec<String>,
    pub fetch_attempts: u32,
}

/// Outcome of a successful statement fetch
#[derive(Debug, Serialize)]
pub struct StatementReport {
    pub account: AccountKey,
    pub year: i32,
    pub period: u32,
    pub statement: Statement,
    #[serde(skip)]
    pub output: Vec<u8>,
    pub fetch_attempts: u32,
}

/// Runs syncs for one account at a time
pub struct SyncService {
    store: Arc<dyn CheckpointStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    logger: Option<Arc<LoggingService>>,
}

impl SyncService {
    pub fn new(store: Arc<dyn CheckpointStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retry: RetryPolicy::default(),
            logger: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Event log failures are reported via tracing and otherwise ignored
    fn record(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log(event) {
                tracing::debug!(error = %e, "failed to write event log");
            }
        }
    }

    fn fail(&self, account: &AccountKey, command: &str, failure: SyncFailure) -> SyncFailure {
        tracing::debug!(stage = %failure.stage, attempts = failure.attempts, "sync failed");
        self.record(
            LogEvent::new("sync_failed")
                .with_bank(account.bank_kind.as_str())
                .with_account(account.to_string())
                .with_command(command)
                .with_error(failure.source.to_string())
                .with_error_details(format!(
                    "stage={} attempts={}",
                    failure.stage, failure.attempts
                )),
        );
        failure
    }

    /// Fetch transactions for one account, advance its checkpoint and
    /// serialize the result
    ///
    /// Explicit dates take precedence over the stored checkpoint, which takes
    /// precedence over the bank's default window.
    pub fn sync_transactions(
        &self,
        account: &AccountKey,
        adapter: &dyn BankAdapter,
        explicit_start: Option<NaiveDate>,
        explicit_end: Option<NaiveDate>,
        serializer: &dyn FormatSerializer,
    ) -> std::result::Result<SyncReport, SyncFailure> {
        const COMMAND: &str = "transactions";
        let today = self.clock.today();

        // ResolveRange
        tracing::debug!(%account, stage = %SyncStage::ResolveRange, "sync stage");
        if !serializer.format().supports_transactions() {
            let err = Error::UnsupportedFormat(format!(
                "{} is only available for statements",
                serializer.format()
            ));
            return Err(self.fail(account, COMMAND, SyncFailure::new(SyncStage::ResolveRange, 0, err)));
        }

        let existing = self
            .store
            .get(account)
            .map_err(|e| self.fail(account, COMMAND, SyncFailure::new(SyncStage::ResolveRange, 0, e)))?;

        let range = range::resolve(
            explicit_start,
            explicit_end,
            existing.as_ref(),
            || adapter.default_range(today),
            today,
        )
        .map_err(|e| self.fail(account, COMMAND, SyncFailure::new(SyncStage::ResolveRange, 0, e)))?;

        // Fetch
        tracing::debug!(%account, %range, stage = %SyncStage::Fetch, "sync stage");
        let (fetched, attempts) = self.retry.run(|| adapter.fetch_transactions(&range));
        let mut transactions = fetched
            .map_err(|e| self.fail(account, COMMAND, SyncFailure::new(SyncStage::Fetch, attempts, e)))?;
        Transaction::sort(&mut transactions);

        // UpdateCheckpoint
        tracing::debug!(%account, stage = %SyncStage::UpdateCheckpoint, "sync stage");
        let mut warnings = Vec::new();
        let previous = existing.map(|cp| cp.last_synced_through);
        let target = range.end().min(today);
        let checkpoint = match self.store.set(account, target) {
            Ok(()) => Some(previous.map_or(target, |p| p.max(target))),
            Err(e) => {
                let err = match e {
                    Error::CheckpointWriteFailed(_) => e,
                    other => Error::CheckpointWriteFailed(other.to_string()),
                };
                tracing::warn!(%account, error = %err, "checkpoint not updated");
                self.record(
                    LogEvent::new("checkpoint_write_failed")
                        .with_bank(account.bank_kind.as_str())
                        .with_account(account.to_string())
                        .with_command(COMMAND)
                        .with_error(err.to_string()),
                );
                warnings.push(err.to_string());
                previous
            }
        };

        // Serialize
        tracing::debug!(%account, stage = %SyncStage::Serialize, "sync stage");
        let output = serializer
            .serialize_transactions(&transactions)
            .map_err(|e| self.fail(account, COMMAND, SyncFailure::new(SyncStage::Serialize, attempts, e)))?;

        tracing::debug!(
            %account,
            count = transactions.len(),
            stage = %SyncStage::Done,
            "sync stage"
        );
        self.record(
            LogEvent::new("sync_completed")
                .with_bank(account.bank_kind.as_str())
                .with_account(account.to_string())
                .with_command(COMMAND),
        );

        Ok(SyncReport {
            account: *account,
            range,
            transactions,
            checkpoint,
            output,
            warnings,
            fetch_attempts: attempts,
        })
    }

    /// Fetch and serialize one statement
    ///
    /// Statements are addressed by (year, period) and never read or move the
    /// sync checkpoint.
    pub fn fetch_statement(
        &self,
        account: &AccountKey,
        adapter: &dyn BankAdapter,
        year: i32,
        period: u32,
        serializer: &dyn FormatSerializer,
    ) -> std::result::Result<StatementReport, SyncFailure> {
        const COMMAND: &str = "statement";

        if !adapter.supports_statements() {
            let err = Error::StatementNotFound { year, period };
            return Err(self.fail(account, COMMAND, SyncFailure::new(SyncStage::Fetch, 0, err)));
        }

        tracing::debug!(%account, year, period, stage = %SyncStage::Fetch, "statement stage");
        let (fetched, attempts) = self.retry.run(|| adapter.fetch_statement(year, period));
        let mut statement = fetched
            .map_err(|e| self.fail(account, COMMAND, SyncFailure::new(SyncStage::Fetch, attempts, e)))?;
        Transaction::sort(&mut statement.transactions);

        tracing::debug!(%account, stage = %SyncStage::Serialize, "statement stage");
        let output = serializer
            .serialize_statement(&statement)
            .map_err(|e| self.fail(account, COMMAND, SyncFailure::new(SyncStage::Serialize, attempts, e)))?;

        self.record(
            LogEvent::new("statement_fetched")
                .with_bank(account.bank_kind.as_str())
                .with_account(account.to_string())
                .with_command(COMMAND),
        );

        Ok(StatementReport {
            account: *account,
            year,
            period,
            statement,
            output,
            fetch_attempts: attempts,
        })
    }
}
