//! Range resolver - decides which dates a transaction fetch covers
//!
//! Precedence:
//! 1. explicit start and end are used verbatim
//! 2. explicit start without end runs until today
//! 3. no explicit dates: continue from the stored checkpoint until today
//! 4. no explicit dates and no checkpoint: the bank's default window
//!
//! The checkpoint is an inclusive start. A transaction dated on the
//! checkpoint day may be fetched twice; ids make that harmless.

use chrono::NaiveDate;

use crate::domain::result::Result;
use crate::domain::{DateRange, SyncCheckpoint};

/// Resolve the effective fetch range
///
/// `bank_default` is only evaluated when neither an explicit start nor a
/// checkpoint is available.
pub fn resolve<F>(
    explicit_start: Option<NaiveDate>,
    explicit_end: Option<NaiveDate>,
    checkpoint: Option<&SyncCheckpoint>,
    bank_default: F,
    today: NaiveDate,
) -> Result<DateRange>
where
    F: FnOnce() -> DateRange,
{
    match (explicit_start, explicit_end) {
        (Some(start), Some(end)) => DateRange::new(start, end),
        (Some(start), None) => DateRange::new(start, today),
        (None, end) => {
            let (start, implicit_end) = match checkpoint {
                Some(cp) => (cp.last_synced_through, today),
                None => {
                    let default = bank_default();
                    (default.start(), default.end())
                }
            };
            DateRange::new(start, end.unwrap_or(implicit_end))
        }
    }
}
