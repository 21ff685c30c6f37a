//! Transaction domain model

use std::cmp::Ordering;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// A single bank transaction, normalized across banks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Bank-assigned (or derived) id, unique within one account
    pub id: String,
    pub date: NaiveDate,
    /// Signed amount: negative for outgoing payments
    pub amount: Decimal,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    pub counterparty: Option<String>,
    pub description: Option<String>,
    /// The bank's own record, kept for lossless re-serialization
    pub raw: JsonValue,
}

impl Transaction {
    /// Create a new transaction with required fields
    pub fn new(
        id: impl Into<String>,
        date: NaiveDate,
        amount: Decimal,
        currency: &str,
    ) -> Self {
        Self {
            id: id.into(),
            date,
            amount,
            currency: Self::normalize_currency(currency),
            counterparty: None,
            description: None,
            raw: JsonValue::Null,
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Ordering used everywhere transactions are listed: by date, then id
    pub fn cmp_by_date_id(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Sort transactions in place by (date, id)
    pub fn sort(transactions: &mut [Transaction]) {
        transactions.sort_by(|a, b| a.cmp_by_date_id(b));
    }

    /// Stable id for banks that don't assign one
    ///
    /// Uses: account index, date, amount, currency, description, counterparty and
    /// the occurrence number of otherwise identical rows within one download,
    /// so two equal payments on the same day keep distinct ids across re-fetches.
    pub fn fingerprint(
        account_index: u32,
        date: NaiveDate,
        amount: Decimal,
        currency: &str,
        description: Option<&str>,
        counterparty: Option<&str>,
        occurrence: usize,
    ) -> String {
        // Normalize amount: treat -0 as 0, fixed scale
        let amount = if amount.is_zero() { Decimal::ZERO } else { amount };
        let fingerprint_str = format!(
            "{}|{}|{:.2}|{}|{}|{}|{}",
            account_index,
            date.format("%Y-%m-%d"),
            amount,
            Self::normalize_currency(currency),
            Self::normalize_text(description),
            Self::normalize_text(counterparty),
            occurrence
        );

        // SHA256 hash, truncated to 16 chars
        let mut hasher = Sha256::new();
        hasher.update(fingerprint_str.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }

    fn normalize_text(text: Option<&str>) -> String {
        text.unwrap_or("")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_currency_normalization() {
        let tx = Transaction::new("1", date(2013, 9, 1), Decimal::new(100, 0), " czk ");
        assert_eq!(tx.currency, "CZK");
    }

    #[test]
    fn test_sort_by_date_then_id() {
        let mut txs = vec![
            Transaction::new("b", date(2013, 9, 2), Decimal::ONE, "CZK"),
            Transaction::new("c", date(2013, 9, 1), Decimal::ONE, "CZK"),
            Transaction::new("a", date(2013, 9, 2), Decimal::ONE, "CZK"),
        ];
        Transaction::sort(&mut txs);
        let ids: Vec<_> = txs.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Transaction::fingerprint(
            0,
            date(2013, 9, 1),
            Decimal::new(-5000, 2),
            "CZK",
            Some("ACME  STORE"),
            None,
            0,
        );
        let b = Transaction::fingerprint(
            0,
            date(2013, 9, 1),
            Decimal::new(-50, 0),
            "czk",
            Some("acme store"),
            None,
            0,
        );
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_distinguishes_occurrences() {
        let first = Transaction::fingerprint(0, date(2013, 9, 1), Decimal::ONE, "CZK", None, None, 0);
        let second = Transaction::fingerprint(0, date(2013, 9, 1), Decimal::ONE, "CZK", None, None, 1);
        assert_ne!(first, second);
    }

    #[test]
    fn test_fingerprint_differs_by_account() {
        let a = Transaction::fingerprint(0, date(2013, 9, 1), Decimal::ONE, "CZK", None, None, 0);
        let b = Transaction::fingerprint(1, date(2013, 9, 1), Decimal::ONE, "CZK", None, None, 0);
        assert_ne!(a, b);
    }
}
