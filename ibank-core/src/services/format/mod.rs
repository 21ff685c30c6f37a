//! Output format serializers
//!
//! One serializer per `OutputFormat`. The set is closed: callers pick the
//! format once and get back a serializer for it.

mod delimited;
mod document;
mod json;
mod ofx;
mod qif;

pub use delimited::DelimitedSerializer;
pub use document::DocumentSerializer;
pub use json::JsonSerializer;
pub use ofx::OfxSerializer;
pub use qif::QifSerializer;

use crate::domain::result::{Error, Result};
use crate::domain::Statement;
use crate::ports::{FormatSerializer, OutputFormat};

/// Get the serializer for an output format
pub fn serializer_for(format: OutputFormat) -> Box<dyn FormatSerializer> {
    match format {
        OutputFormat::Csv => Box::new(DelimitedSerializer::csv()),
        OutputFormat::Tsv => Box::new(DelimitedSerializer::tsv()),
        OutputFormat::Json => Box::new(JsonSerializer),
        OutputFormat::Ofx => Box::new(OfxSerializer),
        OutputFormat::Qif => Box::new(QifSerializer),
        OutputFormat::Pdf => Box::new(DocumentSerializer),
    }
}

/// Row formats can't carry a bank document; refuse rather than drop it
pub(crate) fn ensure_rows(statement: &Statement, format: OutputFormat) -> Result<()> {
    if statement.is_document_only() {
        return Err(Error::UnsupportedFormat(format!(
            "statement {}/{} is only available as pdf, not {}",
            statement.year, statement.period, format
        )));
    }
    Ok(())
}
