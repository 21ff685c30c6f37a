//! Account domain model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::result::Error;

/// Supported banks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BankKind {
    Fio,
    CitibankCz,
}

impl BankKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankKind::Fio => "fio",
            BankKind::CitibankCz => "citibank-cz",
        }
    }

    /// Prefix used for default output file names
    pub fn file_prefix(&self) -> &'static str {
        match self {
            BankKind::Fio => "fio",
            BankKind::CitibankCz => "citibank",
        }
    }
}

impl fmt::Display for BankKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BankKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fio" => Ok(BankKind::Fio),
            "citibank-cz" | "citibankcz" | "citibank" => Ok(BankKind::CitibankCz),
            other => Err(Error::Config(format!(
                "Unknown bank: {}. Available: fio, citibank-cz",
                other
            ))),
        }
    }
}

/// Identifies one synchronized account: the bank plus the configured account index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    pub bank_kind: BankKind,
    pub index: u32,
}

impl AccountKey {
    pub fn new(bank_kind: BankKind, index: u32) -> Self {
        Self { bank_kind, index }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bank_kind, self.index)
    }
}

/// Bank-specific credentials, opaque to the sync engine
#[derive(Clone)]
pub enum Credentials {
    /// Fio API token (one token per account)
    FioToken(String),
    /// Citibank internet banking login; the SMS code is requested during sign-on
    CitibankLogin { username: String, password: String },
}

// Never print secrets
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::FioToken(_) => f.write_str("FioToken(***)"),
            Credentials::CitibankLogin { username, .. } => f
                .debug_struct("CitibankLogin")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// A configured bank account, immutable for one invocation
#[derive(Debug, Clone)]
pub struct Account {
    pub index: u32,
    pub bank_kind: BankKind,
    pub credentials: Credentials,
}

impl Account {
    pub fn new(bank_kind: BankKind, index: u32, credentials: Credentials) -> Self {
        Self {
            index,
            bank_kind,
            credentials,
        }
    }

    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.bank_kind, self.index)
    }
}
