//! CLI command implementations

pub mod bank;
pub mod checkpoint;
pub mod citibank;
pub mod fio;
pub mod logs;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use ibank_core::services::{LogEvent, LoggingService};
use ibank_core::IbankContext;

/// Environment variable overriding the ibank directory
const IBANK_DIR_ENV: &str = "IBANK_DIR";

/// Get the ibank directory from environment or default
pub fn get_ibank_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(IBANK_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".ibank"))
}

/// Get or create the ibank context
pub fn get_context() -> Result<IbankContext> {
    let ibank_dir = get_ibank_dir()?;
    tracing::debug!(dir = %ibank_dir.display(), "using ibank directory");
    IbankContext::new(&ibank_dir).context("Failed to initialize ibank")
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: Option<&LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}
