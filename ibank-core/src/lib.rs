//! ibank Core - incremental bank transaction sync and format conversion
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Transaction, Statement, DateRange, SyncCheckpoint)
//! - **ports**: Trait definitions for external dependencies (BankAdapter, CheckpointStore)
//! - **services**: Orchestration (range resolution, serializers, sync, event log)
//! - **adapters**: Concrete implementations (Fio, Citibank CZ, DuckDB)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::citibank::{CitibankClient, CitibankCzAdapter, SecretPrompt, CITIBANK_SESSION_FILE};
use adapters::duckdb::DuckDbCheckpointStore;
use adapters::fio::{FioAdapter, FioClient};
use config::Config;
use ports::SystemClock;
use services::{LoggingService, SyncService};

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    Account, AccountKey, BankKind, Credentials, DateRange, Statement, StatementDocument,
    SyncCheckpoint, Transaction,
};
pub use ports::{BankAdapter, CheckpointStore, Clock, FormatSerializer, OutputFormat};
pub use services::{
    serializer_for, RetryPolicy, StatementReport, SyncFailure, SyncReport, SyncStage,
};

/// Checkpoint database file inside the ibank directory
pub const CHECKPOINT_DB: &str = "ibank.duckdb";

/// Main context for ibank operations
///
/// Holds the configuration, the checkpoint store and the sync service
/// wired to the system clock.
pub struct IbankContext {
    pub ibank_dir: PathBuf,
    pub config: Config,
    pub store: Arc<DuckDbCheckpointStore>,
    pub logger: Option<Arc<LoggingService>>,
    pub sync_service: SyncService,
}

impl IbankContext {
    /// Create a new ibank context
    ///
    /// The event log is optional: if it can't be opened the context works
    /// without it.
    pub fn new(ibank_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(ibank_dir)
            .with_context(|| format!("Failed to create {}", ibank_dir.display()))?;
        let config = Config::load(ibank_dir)?;

        let store = Arc::new(DuckDbCheckpointStore::open(&ibank_dir.join(CHECKPOINT_DB))?);

        let logger = match LoggingService::new(ibank_dir, env!("CARGO_PKG_VERSION")) {
            Ok(logger) => Some(Arc::new(logger)),
            Err(e) => {
                tracing::warn!(error = %e, "event log unavailable");
                None
            }
        };

        let mut sync_service = SyncService::new(store.clone(), Arc::new(SystemClock))
            .with_retry(config.retry);
        if let Some(logger) = &logger {
            sync_service = sync_service.with_logger(logger.clone());
        }

        Ok(Self {
            ibank_dir: ibank_dir.to_path_buf(),
            config,
            store,
            logger,
            sync_service,
        })
    }

    /// Fio adapter for an account. An explicit token wins over the configured ones.
    pub fn fio_adapter(&self, account_index: u32, token: Option<&str>) -> Result<FioAdapter> {
        let token = match token {
            Some(token) => token.to_string(),
            None => self.config.fio_token(account_index).with_context(|| {
                format!(
                    "No Fio token for account {}: pass --token, set {} or add fio.tokens to settings.json",
                    account_index,
                    config::FIO_TOKEN_ENV
                )
            })?,
        };
        let client = FioClient::new_with_base_url(&token, &self.config.fio_base_url())?;
        Ok(FioAdapter::new(client, account_index))
    }

    /// Citibank adapter for an account. An explicit username wins over the configured one.
    ///
    /// The prompts only run if no saved session in the ibank directory is
    /// still alive.
    pub fn citibank_adapter(
        &self,
        account_index: u32,
        username: Option<&str>,
        password: SecretPrompt,
        sms_code: SecretPrompt,
    ) -> Result<CitibankCzAdapter> {
        let username = username
            .map(str::to_string)
            .or_else(|| self.config.citibank_username.clone())
            .context("No Citibank username: pass --username or add citibank.username to settings.json")?;
        let client = CitibankClient::new_with_base_url(
            &username,
            password,
            sms_code,
            &self.config.citibank_base_url(),
        )?
        .with_session_file(&self.ibank_dir.join(CITIBANK_SESSION_FILE));
        Ok(CitibankCzAdapter::new(client, account_index))
    }
}
