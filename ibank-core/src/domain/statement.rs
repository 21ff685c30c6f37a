//! Statement domain model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Transaction;

/// A document issued by the bank for a statement (e.g. the PDF Citibank sends)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementDocument {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A bank-issued periodic statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub account_id: String,
    pub year: i32,
    /// Statement number within the year (month for Citibank)
    pub period: u32,
    pub currency: Option<String>,
    /// Sorted by (date, id)
    pub transactions: Vec<Transaction>,
    pub opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
    pub document: Option<StatementDocument>,
}

impl Statement {
    /// Create an empty statement for the given period
    pub fn new(account_id: impl Into<String>, year: i32, period: u32) -> Self {
        Self {
            account_id: account_id.into(),
            year,
            period,
            currency: None,
            transactions: Vec::new(),
            opening_balance: None,
            closing_balance: None,
            document: None,
        }
    }

    /// Whether this statement picks up where `previous` left off
    ///
    /// Returns None when the answer can't be known (different accounts or
    /// missing balances). Nothing enforces this; it's a consistency check
    /// for callers that happen to hold consecutive statements.
    pub fn continues(&self, previous: &Statement) -> Option<bool> {
        if self.account_id != previous.account_id {
            return None;
        }
        match (previous.closing_balance, self.opening_balance) {
            (Some(closing), Some(opening)) => Some(closing == opening),
            _ => None,
        }
    }

    /// Only the bank's document carries content; nothing to render as rows
    pub fn is_document_only(&self) -> bool {
        self.document.is_some()
            && self.transactions.is_empty()
            && self.opening_balance.is_none()
            && self.closing_balance.is_none()
    }

    /// Net change over the statement's transactions
    pub fn transactions_total(&self) -> Decimal {
        self.transactions.iter().map(|t| t.amount).sum()
    }
}
