//! Output format port

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::{Statement, Transaction};

/// All output formats, resolved once from configuration or the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Tsv,
    Json,
    Ofx,
    Qif,
    Pdf,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Csv,
        OutputFormat::Tsv,
        OutputFormat::Json,
        OutputFormat::Ofx,
        OutputFormat::Qif,
        OutputFormat::Pdf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Json => "json",
            OutputFormat::Ofx => "ofx",
            OutputFormat::Qif => "qif",
            OutputFormat::Pdf => "pdf",
        }
    }

    /// File extension for default output names
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Whether the format can render a plain transaction list
    pub fn supports_transactions(&self) -> bool {
        !matches!(self, OutputFormat::Pdf)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            // Spreadsheet export: tab separated values
            "tsv" | "xls" => Ok(OutputFormat::Tsv),
            "json" => Ok(OutputFormat::Json),
            "ofx" => Ok(OutputFormat::Ofx),
            // Quicken layout (MM/DD/YYYY); Microsoft Money's variant is not offered
            "qif" | "qif-quicken" => Ok(OutputFormat::Qif),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(Error::UnsupportedFormat(format!(
                "{}. Available: csv, tsv, json, ofx, qif, pdf",
                other
            ))),
        }
    }
}

/// Renders the domain model into bytes
///
/// Implementations are pure: no network or file access. The caller
/// decides where the bytes go.
pub trait FormatSerializer: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn serialize_transactions(&self, transactions: &[Transaction]) -> Result<Vec<u8>>;

    fn serialize_statement(&self, statement: &Statement) -> Result<Vec<u8>>;
}
