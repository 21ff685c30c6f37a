//! Core domain entities
//!
//! Bank-agnostic data structures shared by adapters and serializers.
//! No I/O happens here.

mod account;
mod statement;
mod sync;
mod transaction;
pub mod result;

pub use account::{Account, AccountKey, BankKind, Credentials};
pub use statement::{Statement, StatementDocument};
pub use sync::{DateRange, SyncCheckpoint};
pub use transaction::Transaction;
