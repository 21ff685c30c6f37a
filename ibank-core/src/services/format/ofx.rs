//! OFX 1.0.2 (SGML) output
//!
//! Enough of the bank statement response for personal finance tools to
//! import: one STMTTRN per transaction, LEDGERBAL when a closing balance
//! is known.

use std::fmt::Write;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{Statement, Transaction};
use crate::ports::{FormatSerializer, OutputFormat};

const HEADER: &str = "OFXHEADER:100
DATA:OFXSGML
VERSION:102
SECURITY:NONE
ENCODING:UTF-8
CHARSET:NONE
COMPRESSION:NONE
OLDFILEUID:NONE
NEWFILEUID:NONE
";

/// OFX limits NAME to 32 characters
const MAX_NAME_LEN: usize = 32;

pub struct OfxSerializer;

struct StatementBody<'a> {
    account_id: &'a str,
    currency: String,
    transactions: &'a [Transaction],
    closing_balance: Option<Decimal>,
}

impl OfxSerializer {
    fn render(body: &StatementBody<'_>) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');

        let now = Utc::now().format("%Y%m%d%H%M%S");
        let _ = writeln!(out, "<OFX>");
        let _ = writeln!(out, "<SIGNONMSGSRSV1><SONRS>");
        let _ = writeln!(out, "<STATUS><CODE>0<SEVERITY>INFO</STATUS>");
        let _ = writeln!(out, "<DTSERVER>{}", now);
        let _ = writeln!(out, "<LANGUAGE>ENG");
        let _ = writeln!(out, "</SONRS></SIGNONMSGSRSV1>");
        let _ = writeln!(out, "<BANKMSGSRSV1><STMTTRNRS>");
        let _ = writeln!(out, "<TRNUID>0");
        let _ = writeln!(out, "<STATUS><CODE>0<SEVERITY>INFO</STATUS>");
        let _ = writeln!(out, "<STMTRS>");
        let _ = writeln!(out, "<CURDEF>{}", escape(&body.currency));
        let _ = writeln!(out, "<BANKACCTFROM>");
        let _ = writeln!(out, "<BANKID>0");
        let _ = writeln!(out, "<ACCTID>{}", escape(body.account_id));
        let _ = writeln!(out, "<ACCTTYPE>CHECKING");
        let _ = writeln!(out, "</BANKACCTFROM>");

        let first = body.transactions.iter().map(|t| t.date).min();
        let last = body.transactions.iter().map(|t| t.date).max();
        if let (Some(first), Some(last)) = (first, last) {
            let _ = writeln!(out, "<BANKTRANLIST>");
            let _ = writeln!(out, "<DTSTART>{}", ofx_date(first));
            let _ = writeln!(out, "<DTEND>{}", ofx_date(last));
            for tx in body.transactions {
                write_transaction(&mut out, tx);
            }
            let _ = writeln!(out, "</BANKTRANLIST>");
        }

        if let Some(balance) = body.closing_balance {
            let _ = writeln!(out, "<LEDGERBAL>");
            let _ = writeln!(out, "<BALAMT>{}", balance);
            let _ = writeln!(out, "<DTASOF>{}", last.map(ofx_date).unwrap_or_else(|| now.to_string()));
            let _ = writeln!(out, "</LEDGERBAL>");
        }

        let _ = writeln!(out, "</STMTRS>");
        let _ = writeln!(out, "</STMTTRNRS></BANKMSGSRSV1>");
        let _ = writeln!(out, "</OFX>");
        out
    }
}

fn write_transaction(out: &mut String, tx: &Transaction) {
    let kind = if tx.amount.is_sign_negative() { "DEBIT" } else { "CREDIT" };
    let _ = writeln!(out, "<STMTTRN>");
    let _ = writeln!(out, "<TRNTYPE>{}", kind);
    let _ = writeln!(out, "<DTPOSTED>{}", ofx_date(tx.date));
    let _ = writeln!(out, "<TRNAMT>{}", tx.amount);
    let _ = writeln!(out, "<FITID>{}", escape(&tx.id));
    if let Some(name) = &tx.counterparty {
        let name: String = name.chars().take(MAX_NAME_LEN).collect();
        let _ = writeln!(out, "<NAME>{}", escape(&name));
    }
    if let Some(memo) = &tx.description {
        let _ = writeln!(out, "<MEMO>{}", escape(memo));
    }
    if !tx.currency.is_empty() {
        let _ = writeln!(out, "<CURRENCY><CURRATE>1<CURSYM>{}</CURRENCY>", escape(&tx.currency));
    }
    let _ = writeln!(out, "</STMTTRN>");
}

fn ofx_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// SGML element content: no markup characters, no line breaks
fn escape(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn currency_of(transactions: &[Transaction]) -> String {
    transactions
        .first()
        .map(|t| t.currency.clone())
        .unwrap_or_else(|| "XXX".to_string())
}

impl FormatSerializer for OfxSerializer {
    fn format(&self) -> OutputFormat {
        OutputFormat::Ofx
    }

    fn serialize_transactions(&self, transactions: &[Transaction]) -> Result<Vec<u8>> {
        let body = StatementBody {
            account_id: "UNKNOWN",
            currency: currency_of(transactions),
            transactions,
            closing_balance: None,
        };
        Ok(Self::render(&body).into_bytes())
    }

    fn serialize_statement(&self, statement: &Statement) -> Result<Vec<u8>> {
        super::ensure_rows(statement, self.format())?;
        let body = StatementBody {
            account_id: &statement.account_id,
            currency: statement
                .currency
                .clone()
                .unwrap_or_else(|| currency_of(&statement.transactions)),
            transactions: &statement.transactions,
            closing_balance: statement.closing_balance,
        };
        Ok(Self::render(&body).into_bytes())
    }
}
