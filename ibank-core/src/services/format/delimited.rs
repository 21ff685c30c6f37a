//! CSV and tab-separated output
//!
//! Transaction columns: id,date,amount,currency,counterparty,description
//!
//! Statements prepend the statement columns to every row:
//! account_id,year,period,statement_currency,opening_balance,closing_balance
//! A statement without transactions still gets one row carrying its metadata.

use csv::WriterBuilder;

use crate::domain::result::{Error, Result};
use crate::domain::{Statement, Transaction};
use crate::ports::{FormatSerializer, OutputFormat};

const TRANSACTION_HEADER: [&str; 6] = ["id", "date", "amount", "currency", "counterparty", "description"];
const STATEMENT_HEADER: [&str; 6] = [
    "account_id",
    "year",
    "period",
    "statement_currency",
    "opening_balance",
    "closing_balance",
];

pub struct DelimitedSerializer {
    delimiter: u8,
    format: OutputFormat,
}

impl DelimitedSerializer {
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            format: OutputFormat::Csv,
        }
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            format: OutputFormat::Tsv,
        }
    }

    fn transaction_fields(tx: &Transaction) -> [String; 6] {
        [
            tx.id.clone(),
            tx.date.format("%Y-%m-%d").to_string(),
            tx.amount.to_string(),
            tx.currency.clone(),
            tx.counterparty.clone().unwrap_or_default(),
            tx.description.clone().unwrap_or_default(),
        ]
    }

    fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
        writer
            .into_inner()
            .map_err(|e| Error::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

impl FormatSerializer for DelimitedSerializer {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn serialize_transactions(&self, transactions: &[Transaction]) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());

        writer.write_record(TRANSACTION_HEADER)?;
        for tx in transactions {
            writer.write_record(Self::transaction_fields(tx))?;
        }
        Self::finish(writer)
    }

    fn serialize_statement(&self, statement: &Statement) -> Result<Vec<u8>> {
        super::ensure_rows(statement, self.format())?;
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());

        writer.write_record(STATEMENT_HEADER.iter().chain(TRANSACTION_HEADER.iter()))?;

        let meta = [
            statement.account_id.clone(),
            statement.year.to_string(),
            statement.period.to_string(),
            statement.currency.clone().unwrap_or_default(),
            statement
                .opening_balance
                .map(|b| b.to_string())
                .unwrap_or_default(),
            statement
                .closing_balance
                .map(|b| b.to_string())
                .unwrap_or_default(),
        ];

        if statement.transactions.is_empty() {
            writer.write_record(meta.iter().chain(std::iter::repeat(&String::new()).take(6)))?;
        }
        for tx in &statement.transactions {
            writer.write_record(meta.iter().chain(Self::transaction_fields(tx).iter()))?;
        }
        Self::finish(writer)
    }
}
