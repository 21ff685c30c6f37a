//! Pass-through of the document a bank issued for a statement

use crate::domain::result::{Error, Result};
use crate::domain::{Statement, Transaction};
use crate::ports::{FormatSerializer, OutputFormat};

pub struct DocumentSerializer;

impl FormatSerializer for DocumentSerializer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Pdf
    }

    fn serialize_transactions(&self, _transactions: &[Transaction]) -> Result<Vec<u8>> {
        Err(Error::UnsupportedFormat(
            "pdf is only available for statements".to_string(),
        ))
    }

    fn serialize_statement(&self, statement: &Statement) -> Result<Vec<u8>> {
        match &statement.document {
            Some(doc) => Ok(doc.bytes.clone()),
            None => Err(Error::UnsupportedFormat(format!(
                "statement {}/{} has no pdf document",
                statement.year, statement.period
            ))),
        }
    }
}
