//! QIF output (Quicken Interchange Format, bank account type)

use std::fmt::Write;

use crate::domain::result::Result;
use crate::domain::{Statement, Transaction};
use crate::ports::{FormatSerializer, OutputFormat};

pub struct QifSerializer;

impl QifSerializer {
    fn write_entries(out: &mut String, transactions: &[Transaction]) {
        let _ = writeln!(out, "!Type:Bank");
        for tx in transactions {
            let _ = writeln!(out, "D{}", tx.date.format("%m/%d/%Y"));
            let _ = writeln!(out, "T{}", tx.amount);
            if let Some(payee) = &tx.counterparty {
                let _ = writeln!(out, "P{}", single_line(payee));
            }
            if let Some(memo) = &tx.description {
                let _ = writeln!(out, "M{}", single_line(memo));
            }
            let _ = writeln!(out, "N{}", tx.id);
            let _ = writeln!(out, "^");
        }
    }
}

/// QIF fields are line-based
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl FormatSerializer for QifSerializer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Qif
    }

    fn serialize_transactions(&self, transactions: &[Transaction]) -> Result<Vec<u8>> {
        let mut out = String::new();
        Self::write_entries(&mut out, transactions);
        Ok(out.into_bytes())
    }

    fn serialize_statement(&self, statement: &Statement) -> Result<Vec<u8>> {
        super::ensure_rows(statement, self.format())?;
        let mut out = String::new();
        Self::write_entries(&mut out, &statement.transactions);
        Ok(out.into_bytes())
    }
}
