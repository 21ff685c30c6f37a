//! JSON output
//!
//! The only format that keeps everything: bank raw records, balances and
//! the statement document (base64 encoded).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{Statement, Transaction};
use crate::ports::{FormatSerializer, OutputFormat};

pub struct JsonSerializer;

#[derive(Serialize)]
struct TransactionsView<'a> {
    count: usize,
    transactions: &'a [Transaction],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatementView<'a> {
    account_id: &'a str,
    year: i32,
    period: u32,
    currency: Option<&'a str>,
    opening_balance: Option<Decimal>,
    closing_balance: Option<Decimal>,
    transactions: &'a [Transaction],
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<DocumentView<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentView<'a> {
    content_type: &'a str,
    base64: String,
}

impl FormatSerializer for JsonSerializer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn serialize_transactions(&self, transactions: &[Transaction]) -> Result<Vec<u8>> {
        let view = TransactionsView {
            count: transactions.len(),
            transactions,
        };
        let mut out = serde_json::to_vec_pretty(&view)?;
        out.push(b'\n');
        Ok(out)
    }

    fn serialize_statement(&self, statement: &Statement) -> Result<Vec<u8>> {
        let view = StatementView {
            account_id: &statement.account_id,
            year: statement.year,
            period: statement.period,
            currency: statement.currency.as_deref(),
            opening_balance: statement.opening_balance,
            closing_balance: statement.closing_balance,
            transactions: &statement.transactions,
            document: statement.document.as_ref().map(|d| DocumentView {
                content_type: &d.content_type,
                base64: BASE64.encode(&d.bytes),
            }),
        };
        let mut out = serde_json::to_vec_pretty(&view)?;
        out.push(b'\n');
        Ok(out)
    }
}
