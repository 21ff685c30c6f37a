//! DuckDB checkpoint store
//!
//! Keeps one row per (bank, account) in `sync_checkpoints`. Monotonicity is
//! enforced by the database: `set` is a single upsert that keeps the greater
//! of the stored and the new date, so concurrent writers never lose an
//! advance.
//!
//! The database file is only held while an operation runs. Every `get`,
//! `set` or `list` opens its own connection and closes it on return, so a
//! sync waiting on a password prompt or a slow bank doesn't lock out other
//! ibank processes. DuckDB's file lock serializes processes; a mutex
//! serializes connections within this one.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::{params, Connection};

use crate::domain::result::{Error, Result};
use crate::domain::{AccountKey, BankKind, SyncCheckpoint};
use crate::migrations::MIGRATIONS;
use crate::ports::CheckpointStore;
use crate::services::MigrationService;

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const UPSERT_SQL: &str = "
    INSERT INTO sync_checkpoints (bank_kind, account_index, last_synced_through, updated_at)
    VALUES (?, ?, CAST(? AS DATE), CAST(? AS TIMESTAMP))
    ON CONFLICT (bank_kind, account_index) DO UPDATE SET
        updated_at = CASE
            WHEN EXCLUDED.last_synced_through > last_synced_through THEN EXCLUDED.updated_at
            ELSE updated_at
        END,
        last_synced_through = GREATEST(last_synced_through, EXCLUDED.last_synced_through)
";

const SELECT_COLUMNS: &str =
    "bank_kind, account_index, last_synced_through::VARCHAR, updated_at::VARCHAR";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("could not set lock")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// An open connection plus this process's claim on the database file
///
/// Fields drop in order: the connection closes before the claim is released.
struct Session<'a> {
    conn: Connection,
    _claim: MutexGuard<'a, ()>,
}

impl Deref for Session<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

/// DuckDB-backed `CheckpointStore`
pub struct DuckDbCheckpointStore {
    db_path: PathBuf,
    claim: Mutex<()>,
}

impl DuckDbCheckpointStore {
    /// Create the checkpoint database if needed and bring its schema up to date
    ///
    /// The connection used for migrations is closed again before returning.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Self::connect(db_path)?;
        MigrationService::new(&conn, MIGRATIONS)
            .run_pending()
            .map_err(|e| Error::Checkpoint(format!("Migration failed: {}", e)))?;
        drop(conn);

        Ok(Self {
            db_path: db_path.to_path_buf(),
            claim: Mutex::new(()),
        })
    }

    /// Open a connection, retrying with exponential backoff while another
    /// process holds the database file lock
    fn connect(db_path: &Path) -> Result<Connection> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            path = %db_path.display(),
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            error = %err_msg,
                            "checkpoint database busy, retrying"
                        );
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Checkpoint(format!(
                        "Failed to open {}: {}",
                        db_path.display(),
                        err_msg
                    )));
                }
            }
        }
    }

    fn try_open_connection(db_path: &Path) -> std::result::Result<Connection, duckdb::Error> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    fn session(&self) -> Result<Session<'_>> {
        let claim = self
            .claim
            .lock()
            .map_err(|e| Error::Checkpoint(format!("Lock poisoned: {}", e)))?;
        let conn = Self::connect(&self.db_path)?;
        Ok(Session {
            conn,
            _claim: claim,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// All stored checkpoints, ordered by bank and account index
    pub fn list(&self) -> Result<Vec<SyncCheckpoint>> {
        let conn = self.session()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sync_checkpoints ORDER BY bank_kind, account_index",
                SELECT_COLUMNS
            ))
            .map_err(read_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(read_error)?;

        let mut checkpoints = Vec::new();
        for row in rows {
            let (bank, index, through, updated) = row.map_err(read_error)?;
            checkpoints.push(row_to_checkpoint(&bank, index, &through, &updated)?);
        }
        Ok(checkpoints)
    }

    /// Forget the checkpoint of one account. Returns whether one existed.
    pub fn clear(&self, account: &AccountKey) -> Result<bool> {
        let conn = self.session()?;
        let deleted = conn
            .execute(
                "DELETE FROM sync_checkpoints WHERE bank_kind = ? AND account_index = ?",
                params![account.bank_kind.as_str(), account.index as i64],
            )
            .map_err(|e| Error::CheckpointWriteFailed(e.to_string()))?;
        Ok(deleted > 0)
    }

    /// Forget the checkpoints of every account of a bank
    pub fn clear_bank(&self, bank_kind: BankKind) -> Result<usize> {
        let conn = self.session()?;
        conn.execute(
            "DELETE FROM sync_checkpoints WHERE bank_kind = ?",
            [bank_kind.as_str()],
        )
        .map_err(|e| Error::CheckpointWriteFailed(e.to_string()))
    }
}

impl CheckpointStore for DuckDbCheckpointStore {
    fn get(&self, account: &AccountKey) -> Result<Option<SyncCheckpoint>> {
        let conn = self.session()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sync_checkpoints WHERE bank_kind = ? AND account_index = ?",
                SELECT_COLUMNS
            ))
            .map_err(read_error)?;

        let mut rows = stmt
            .query(params![account.bank_kind.as_str(), account.index as i64])
            .map_err(read_error)?;

        match rows.next().map_err(read_error)? {
            Some(row) => {
                let bank: String = row.get(0).map_err(read_error)?;
                let index: i64 = row.get(1).map_err(read_error)?;
                let through: String = row.get(2).map_err(read_error)?;
                let updated: String = row.get(3).map_err(read_error)?;
                row_to_checkpoint(&bank, index, &through, &updated).map(Some)
            }
            None => Ok(None),
        }
    }

    fn set(&self, account: &AccountKey, through: NaiveDate) -> Result<()> {
        let conn = self.session()?;
        let now = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string();
        conn.execute(
            UPSERT_SQL,
            params![
                account.bank_kind.as_str(),
                account.index as i64,
                through.format("%Y-%m-%d").to_string(),
                now,
            ],
        )
        .map_err(|e| Error::CheckpointWriteFailed(e.to_string()))?;

        tracing::debug!(%account, %through, "checkpoint written");
        Ok(())
    }
}

fn read_error(e: duckdb::Error) -> Error {
    Error::Checkpoint(e.to_string())
}

fn row_to_checkpoint(
    bank: &str,
    index: i64,
    through: &str,
    updated: &str,
) -> Result<SyncCheckpoint> {
    let bank_kind = BankKind::from_str(bank)
        .map_err(|_| Error::Checkpoint(format!("Unknown bank in checkpoint table: {}", bank)))?;
    let index = u32::try_from(index)
        .map_err(|_| Error::Checkpoint(format!("Invalid account index: {}", index)))?;
    let last_synced_through = NaiveDate::parse_from_str(through, "%Y-%m-%d")
        .map_err(|e| Error::Checkpoint(format!("Invalid checkpoint date '{}': {}", through, e)))?;

    Ok(SyncCheckpoint {
        account: AccountKey::new(bank_kind, index),
        last_synced_through,
        updated_at: parse_timestamp(updated)?,
    })
}

/// DuckDB renders TIMESTAMP as `YYYY-MM-DD HH:MM:SS[.ffffff]`
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc())
        .map_err(|e| Error::Checkpoint(format!("Invalid checkpoint timestamp '{}': {}", s, e)))
}
