//! Bank adapter port
//!
//! Defines the interface for fetching transactions and statements from a
//! bank. Each bank translates its native responses into the shared domain
//! model; the sync service never branches on which bank it talks to.

use chrono::NaiveDate;

use crate::domain::result::Result;
use crate::domain::{BankKind, DateRange, Statement, Transaction};
use crate::ports::OutputFormat;

/// Bank adapter trait
///
/// Implementations only talk to the bank. They must not read or write
/// sync checkpoints; that is the sync service's job.
pub trait BankAdapter: Send + Sync {
    /// Which bank this adapter talks to
    fn kind(&self) -> BankKind;

    /// Adapter name (e.g., "fio", "citibank-cz")
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Whether this bank can return statements
    fn supports_statements(&self) -> bool;

    /// Format the bank issues statements in, when it only issues documents
    ///
    /// Callers use it in place of the configured default so a document
    /// isn't requested in a format that can't hold it.
    fn statement_format(&self) -> Option<OutputFormat> {
        None
    }

    /// Whether this bank authenticates with an API token
    fn requires_token(&self) -> bool;

    /// Window to fetch when there is neither a checkpoint nor an explicit start
    fn default_range(&self, today: NaiveDate) -> DateRange;

    /// Fetch transactions in `[range.start, range.end)`, sorted by (date, id)
    ///
    /// # Errors
    /// * `UpstreamUnavailable` - network or HTTP failure
    /// * `AuthenticationFailed` - invalid credentials or token
    fn fetch_transactions(&self, range: &DateRange) -> Result<Vec<Transaction>>;

    /// Fetch one statement
    ///
    /// # Arguments
    /// * `year` - Statement year
    /// * `period` - Statement number within the year (bank-specific numbering)
    ///
    /// # Errors
    /// * `StatementNotFound` - the bank has no such statement
    /// * `AuthenticationFailed`, `UpstreamUnavailable`
    fn fetch_statement(&self, year: i32, period: u32) -> Result<Statement>;
}
