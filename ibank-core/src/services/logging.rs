//! Logging service - structured event log in logs.duckdb
//!
//! Records what ibank did (syncs, statement downloads, checkpoint failures)
//! so a failed run can be inspected later with `ibank logs`. Never records
//! transactions, balances, tokens or passwords.
//!
//! Like the checkpoint store, the log database is opened per call so a
//! long-running sync never keeps other ibank processes out of it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::Utc;
use duckdb::types::Value;
use duckdb::Connection;
use serde::{Deserialize, Serialize};

use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::migration::MigrationService;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Timestamp in the lower 48 bits, per-millisecond counter in the upper 16
fn generate_id() -> u64 {
    let timestamp = now_ms() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// A log event to be recorded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn with_bank(mut self, bank: impl Into<String>) -> Self {
        self.bank = Some(bank.into());
        self
    }

    /// Account key, e.g. "fio:0"
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Additional context, e.g. the stage and attempt count of a failed sync
    pub fn with_error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub bank: Option<String>,
    pub account: Option<String>,
    pub command: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
}

impl LogEntry {
    /// Value of a `key=value` pair in the error details, e.g. `stage`
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.error_details.as_deref()?.split_whitespace().find_map(|pair| {
            pair.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// Which entries to read back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    /// Bank name, e.g. "fio"
    pub bank: Option<String>,
    /// Account key, e.g. "fio:0"
    pub account: Option<String>,
    pub errors_only: bool,
}

impl LogFilter {
    pub fn errors() -> Self {
        Self {
            errors_only: true,
            ..Default::default()
        }
    }

    /// WHERE clause and its bound values
    fn to_sql(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        if let Some(bank) = &self.bank {
            conditions.push("bank = ?");
            values.push(Value::Text(bank.clone()));
        }
        if let Some(account) = &self.account {
            conditions.push("account = ?");
            values.push(Value::Text(account.clone()));
        }
        if self.errors_only {
            conditions.push("error_message IS NOT NULL");
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

const ENTRY_COLUMNS: &str = "id, timestamp, app_version, platform, event, bank, account, \
                             command, error_message, error_details";

/// Service for structured event logging
pub struct LoggingService {
    claim: Mutex<()>,
    db_path: PathBuf,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create logs.duckdb in the ibank directory and migrate it
    pub fn new(ibank_dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        std::fs::create_dir_all(ibank_dir)?;
        let db_path = ibank_dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;
        MigrationService::new(&conn, LOG_MIGRATIONS).run_pending()?;
        drop(conn);

        Ok(Self {
            claim: Mutex::new(()),
            db_path,
            app_version: app_version.into(),
            platform: detect_platform(),
        })
    }

    /// Run `f` on a fresh connection, closed again before returning
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _claim = self.claim.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let conn = Connection::open(&self.db_path)?;
        f(&conn)
    }

    /// Record an event; app version and platform are added automatically
    pub fn log(&self, event: LogEvent) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO sys_logs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    ENTRY_COLUMNS
                ),
                duckdb::params![
                    generate_id(),
                    now_ms(),
                    &self.app_version,
                    self.platform,
                    &event.event,
                    &event.bank,
                    &event.account,
                    &event.command,
                    &event.error_message,
                    &event.error_details,
                ],
            )?;
            Ok(())
        })
    }

    pub fn log_event(&self, event: &str) -> Result<()> {
        self.log(LogEvent::new(event))
    }

    pub fn log_error(&self, event: &str, message: &str, details: Option<&str>) -> Result<()> {
        let mut log_event = LogEvent::new(event).with_error(message);
        if let Some(d) = details {
            log_event = log_event.with_error_details(d);
        }
        self.log(log_event)
    }

    /// Entries matching `filter`, most recent first
    pub fn entries(&self, filter: &LogFilter, limit: usize) -> Result<Vec<LogEntry>> {
        let (clause, mut values) = filter.to_sql();
        values.push(Value::BigInt(limit as i64));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sys_logs {} ORDER BY timestamp DESC, id DESC LIMIT ?",
                ENTRY_COLUMNS, clause
            ))?;
            let entries = stmt
                .query_map(duckdb::params_from_iter(values), |row| {
                    Ok(LogEntry {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        app_version: row.get(2)?,
                        platform: row.get(3)?,
                        event: row.get(4)?,
                        bank: row.get(5)?,
                        account: row.get(6)?,
                        command: row.get(7)?,
                        error_message: row.get(8)?,
                        error_details: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
    }

    /// Most recent entries first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.entries(&LogFilter::default(), limit)
    }

    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.entries(&LogFilter::errors(), limit)
    }

    /// Number of entries matching `filter`
    pub fn count(&self, filter: &LogFilter) -> Result<u64> {
        let (clause, values) = filter.to_sql();
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM sys_logs {}", clause),
                duckdb::params_from_iter(values),
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Delete logs older than the given unix timestamp in milliseconds
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
            Ok(deleted as u64)
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
