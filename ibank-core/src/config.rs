//! Configuration management
//!
//! Settings live in `settings.json` in the ibank directory:
//! ```json
//! {
//!   "app": { "defaultFormat": "csv", "retry": { "maxAttempts": 3, "initialDelayMs": 500 } },
//!   "fio": { "tokens": ["..."], "baseUrl": null },
//!   "citibank": { "username": "jan", "baseUrl": null }
//! }
//! ```
//! Fields this crate doesn't manage are kept when saving.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{citibank, fio};
use crate::ports::OutputFormat;
use crate::services::RetryPolicy;

/// Environment variable holding the Fio API token
pub const FIO_TOKEN_ENV: &str = "IBANK_FIO_TOKEN";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    fio: FioSettings,
    #[serde(default)]
    citibank: CitibankSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry: Option<RetrySettings>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrySettings {
    max_attempts: u32,
    initial_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FioSettings {
    #[serde(default)]
    tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitibankSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// ibank configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    pub default_format: OutputFormat,
    pub retry: RetryPolicy,
    pub fio_tokens: Vec<String>,
    pub fio_base_url: Option<String>,
    pub citibank_username: Option<String>,
    pub citibank_base_url: Option<String>,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_format: OutputFormat::Csv,
            retry: RetryPolicy::default(),
            fio_tokens: Vec::new(),
            fio_base_url: None,
            citibank_username: None,
            citibank_base_url: None,
            _raw_settings: SettingsFile::default(),
        }
    }
}

impl Config {
    /// Load config from the ibank directory
    ///
    /// A missing settings file gives the defaults. An unreadable one is
    /// reported and ignored.
    pub fn load(ibank_dir: &Path) -> Result<Self> {
        let settings_path = ibank_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %settings_path.display(), error = %e, "ignoring malformed settings");
                SettingsFile::default()
            })
        } else {
            SettingsFile::default()
        };

        let default_format = match raw.app.default_format.as_deref() {
            Some(name) => name
                .parse()
                .with_context(|| format!("Invalid app.defaultFormat in {}", settings_path.display()))?,
            None => OutputFormat::Csv,
        };

        let retry = match &raw.app.retry {
            Some(r) => RetryPolicy {
                max_attempts: r.max_attempts.max(1),
                initial_delay: Duration::from_millis(r.initial_delay_ms),
            },
            None => RetryPolicy::default(),
        };

        Ok(Self {
            default_format,
            retry,
            fio_tokens: raw.fio.tokens.clone(),
            fio_base_url: raw.fio.base_url.clone(),
            citibank_username: raw.citibank.username.clone(),
            citibank_base_url: raw.citibank.base_url.clone(),
            _raw_settings: raw,
        })
    }

    /// Save config to the ibank directory
    /// Preserves other settings that the CLI doesn't manage
    pub fn save(&self, ibank_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(ibank_dir)?;
        let settings_path = ibank_dir.join("settings.json");

        // Load existing settings to preserve fields we don't manage
        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            self._raw_settings.clone()
        };

        settings.app.default_format = Some(self.default_format.as_str().to_string());
        settings.app.retry = Some(RetrySettings {
            max_attempts: self.retry.max_attempts,
            initial_delay_ms: self.retry.initial_delay.as_millis() as u64,
        });
        settings.fio.tokens = self.fio_tokens.clone();
        settings.fio.base_url = self.fio_base_url.clone();
        settings.citibank.username = self.citibank_username.clone();
        settings.citibank.base_url = self.citibank_base_url.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Fio token for an account: `IBANK_FIO_TOKEN`, then `fio.tokens[index]`
    pub fn fio_token(&self, account_index: u32) -> Option<String> {
        std::env::var(FIO_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.fio_tokens.get(account_index as usize).cloned())
    }

    /// Fio API URL: `IBANK_FIO_BASE_URL`, then `fio.baseUrl`, then production
    pub fn fio_base_url(&self) -> String {
        match (std::env::var(fio::FIO_BASE_URL_ENV).ok(), &self.fio_base_url) {
            (Some(url), _) => url,
            (None, Some(url)) => url.clone(),
            (None, None) => fio::get_base_url(),
        }
    }

    /// Citibank URL: `IBANK_CITIBANK_BASE_URL`, then `citibank.baseUrl`, then production
    pub fn citibank_base_url(&self) -> String {
        match (
            std::env::var(citibank::CITIBANK_BASE_URL_ENV).ok(),
            &self.citibank_base_url,
        ) {
            (Some(url), _) => url,
            (None, Some(url)) => url.clone(),
            (None, None) => citibank::get_base_url(),
        }
    }
}
