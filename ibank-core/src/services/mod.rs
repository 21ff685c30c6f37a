//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod format;
pub mod logging;
pub mod migration;
pub mod range;
mod sync;

pub use format::serializer_for;
pub use logging::{LogEntry, LogEvent, LogFilter, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use sync::{RetryPolicy, StatementReport, SyncFailure, SyncReport, SyncService, SyncStage};
