//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The sync engine
//! depends only on these traits, not on concrete implementations.

mod bank_adapter;
mod checkpoint_store;
mod clock;
mod serializer;

pub use bank_adapter::BankAdapter;
pub use checkpoint_store::CheckpointStore;
pub use clock::{Clock, FixedClock, SystemClock};
pub use serializer::{FormatSerializer, OutputFormat};
