//! Sync state store port

use chrono::NaiveDate;

use crate::domain::result::Result;
use crate::domain::{AccountKey, SyncCheckpoint};

/// Persists the last synchronized date per account
///
/// Must survive process restarts. `set` never lowers a stored value: a
/// smaller date than the one stored is ignored, and concurrent writers for
/// the same account must not lose updates.
pub trait CheckpointStore: Send + Sync {
    /// Get the checkpoint for an account, if one was ever written
    fn get(&self, account: &AccountKey) -> Result<Option<SyncCheckpoint>>;

    /// Advance the checkpoint for an account to `through`
    fn set(&self, account: &AccountKey, through: NaiveDate) -> Result<()>;
}
