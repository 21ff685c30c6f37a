//! Fio banka API client
//!
//! Token-based JSON REST API. Dates in the URL are inclusive on both ends,
//! so a closed-open range `[start, end)` is requested as `start..=end-1`.
//!
//! API documentation: https://www.fio.cz/docs/cz/API_Bankovnictvi.pdf
//!
//! Fio allows one request per token every 30 seconds and answers 409 when
//! called more often.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};
use crate::domain::{BankKind, DateRange, Statement, Transaction};
use crate::ports::BankAdapter;

/// Default production API URL
const FIO_PRODUCTION_URL: &str = "https://fioapi.fio.cz/v1/rest";

/// Environment variable to override the Fio API base URL
pub const FIO_BASE_URL_ENV: &str = "IBANK_FIO_BASE_URL";

/// Fio serves at most 90 days of history without strong authorization
pub const FIO_DEFAULT_WINDOW_DAYS: i64 = 90;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Fio answers 409 until this long after the previous request with the same token
const FIO_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(30);

/// Get the Fio base URL, checking the environment variable first
pub fn get_base_url() -> String {
    std::env::var(FIO_BASE_URL_ENV).unwrap_or_else(|_| FIO_PRODUCTION_URL.to_string())
}

/// What a request was for, to map 404 correctly
#[derive(Debug, Clone, Copy)]
enum Resource {
    Transactions,
    Statement { year: i32, period: u32 },
}

/// Fio API client
pub struct FioClient {
    client: Client,
    token: String,
    base_url: String,
}

impl FioClient {
    /// Create a client against the URL from `IBANK_FIO_BASE_URL`, or production
    pub fn new(token: &str) -> Result<Self> {
        Self::new_with_base_url(token, &get_base_url())
    }

    pub fn new_with_base_url(token: &str, base_url: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Config("Fio token cannot be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the raw account statement JSON for an inclusive date interval
    pub fn get_period(&self, from: NaiveDate, to: NaiveDate) -> Result<JsonValue> {
        let path = format!(
            "periods/{{token}}/{}/{}/transactions.json",
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );
        self.get_json(&path, Resource::Transactions)
    }

    /// Fetch the raw JSON of statement `period` of `year`
    pub fn get_statement(&self, year: i32, period: u32) -> Result<JsonValue> {
        let path = format!("by-id/{{token}}/{}/{}/transactions.json", year, period);
        self.get_json(&path, Resource::Statement { year, period })
    }

    /// GET `path` with the token substituted; the token never appears in logs
    fn get_json(&self, path: &str, resource: Resource) -> Result<JsonValue> {
        tracing::debug!(path, "fio request");
        let url = format!("{}/{}", self.base_url, path.replace("{token}", &self.token));

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(map_request_error)?;

        check_response_status(response.status().as_u16(), resource)?;

        response
            .json::<JsonValue>()
            .map_err(|e| Error::invalid_response(format!("Fio JSON: {}", e.without_url())))
    }
}

fn map_request_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::upstream(format!(
            "Connection to Fio timed out after {} seconds",
            REQUEST_TIMEOUT_SECS
        ))
    } else if error.is_connect() {
        Error::upstream("Unable to connect to Fio servers")
    } else {
        Error::upstream(format!("Fio request failed: {}", error.without_url()))
    }
}

/// Map an HTTP status to the error it means for Fio
fn check_response_status(status: u16, resource: Resource) -> Result<()> {
    match (status, resource) {
        (200, _) => Ok(()),
        (401 | 403, _) => Err(Error::auth(
            "Fio rejected the token. It may be invalid, expired or revoked.",
        )),
        (404, Resource::Statement { year, period }) => {
            Err(Error::StatementNotFound { year, period })
        }
        (409, _) => Err(Error::RateLimited {
            message: "Fio allows one request per token every 30 seconds".to_string(),
            retry_after: FIO_RATE_LIMIT_WINDOW,
        }),
        (500..=599, _) => Err(Error::upstream(format!("Fio server error: HTTP {}", status))),
        (status, _) => Err(Error::upstream(format!("Fio API error: HTTP {}", status))),
    }
}

/// Value of column `n` of a Fio transaction record, None when absent or null
fn column(record: &JsonValue, n: u32) -> Option<&JsonValue> {
    record
        .get(format!("column{}", n))
        .and_then(|c| c.get("value"))
        .filter(|v| !v.is_null())
}

fn column_text(record: &JsonValue, n: u32) -> Option<String> {
    match column(record, n)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

/// Parse a JSON number (or numeric string) into a Decimal
fn json_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => n.to_string().parse().ok(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fio dates look like "2013-09-02+0200"
fn parse_fio_date(value: &str) -> Option<NaiveDate> {
    value
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

/// Map one Fio transaction record to the domain model
///
/// Columns used: 22 id, 0 date, 1 amount, 14 currency, 10 counterparty
/// name, 2/3 counter account and bank code, 16 message, 25 comment,
/// 7 user identification. The whole record is kept as `raw`.
fn map_transaction(
    record: &JsonValue,
    account_index: u32,
    fallback_currency: Option<&str>,
    occurrences: &mut HashMap<String, usize>,
) -> Result<Transaction> {
    let date = column(record, 0)
        .and_then(|v| v.as_str())
        .and_then(parse_fio_date)
        .ok_or_else(|| Error::invalid_response("Fio transaction without a valid date"))?;
    let amount = column(record, 1)
        .and_then(json_decimal)
        .ok_or_else(|| Error::invalid_response("Fio transaction without a valid amount"))?;
    let currency = column_text(record, 14)
        .or_else(|| fallback_currency.map(str::to_string))
        .unwrap_or_else(|| "CZK".to_string());

    let counterparty = column_text(record, 10).or_else(|| {
        let account = column_text(record, 2)?;
        Some(match column_text(record, 3) {
            Some(bank) => format!("{}/{}", account, bank),
            None => account,
        })
    });
    let description = column_text(record, 16)
        .or_else(|| column_text(record, 25))
        .or_else(|| column_text(record, 7));

    let id = match column_text(record, 22) {
        Some(id) => id,
        None => {
            let base = Transaction::fingerprint(
                account_index,
                date,
                amount,
                &currency,
                description.as_deref(),
                counterparty.as_deref(),
                0,
            );
            let occurrence = occurrences.entry(base).or_insert(0);
            *occurrence += 1;
            Transaction::fingerprint(
                account_index,
                date,
                amount,
                &currency,
                description.as_deref(),
                counterparty.as_deref(),
                *occurrence,
            )
        }
    };

    let mut tx = Transaction::new(id, date, amount, &currency);
    tx.counterparty = counterparty;
    tx.description = description;
    tx.raw = record.clone();
    Ok(tx)
}

/// Map the `accountStatement` document to a statement with its transactions
fn map_statement(doc: &JsonValue, account_index: u32, year: i32, period: u32) -> Result<Statement> {
    let account_statement = doc
        .get("accountStatement")
        .ok_or_else(|| Error::invalid_response("Fio response without accountStatement"))?;
    let info = account_statement.get("info").unwrap_or(&JsonValue::Null);

    let account_id = match info.get("accountId") {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => account_index.to_string(),
    };

    let mut statement = Statement::new(account_id, year, period);
    statement.currency = info
        .get("currency")
        .and_then(|c| c.as_str())
        .map(Transaction::normalize_currency);
    statement.opening_balance = info.get("openingBalance").and_then(json_decimal);
    statement.closing_balance = info.get("closingBalance").and_then(json_decimal);

    let records = account_statement
        .get("transactionList")
        .and_then(|l| l.get("transaction"))
        .and_then(|t| t.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[]);

    let mut occurrences = HashMap::new();
    let mut transactions = records
        .iter()
        .map(|r| map_transaction(r, account_index, statement.currency.as_deref(), &mut occurrences))
        .collect::<Result<Vec<_>>>()?;
    Transaction::sort(&mut transactions);
    statement.transactions = transactions;

    Ok(statement)
}

/// Fio bank adapter
pub struct FioAdapter {
    client: FioClient,
    account_index: u32,
}

impl FioAdapter {
    pub fn new(client: FioClient, account_index: u32) -> Self {
        Self {
            client,
            account_index,
        }
    }
}

impl BankAdapter for FioAdapter {
    fn kind(&self) -> BankKind {
        BankKind::Fio
    }

    fn supports_statements(&self) -> bool {
        true
    }

    fn requires_token(&self) -> bool {
        true
    }

    fn default_range(&self, today: NaiveDate) -> DateRange {
        DateRange::last_days(today, FIO_DEFAULT_WINDOW_DAYS)
    }

    fn fetch_transactions(&self, range: &DateRange) -> Result<Vec<Transaction>> {
        let last_day = match range.last_day() {
            Some(day) => day,
            None => return Ok(Vec::new()),
        };

        let doc = self.client.get_period(range.start(), last_day)?;
        let statement = map_statement(&doc, self.account_index, 0, 0)?;

        // Fio may report pending rows outside the window; keep only what was asked for
        let transactions: Vec<Transaction> = statement
            .transactions
            .into_iter()
            .filter(|t| range.contains(t.date))
            .collect();

        tracing::debug!(count = transactions.len(), %range, "fio transactions fetched");
        Ok(transactions)
    }

    fn fetch_statement(&self, year: i32, period: u32) -> Result<Statement> {
        let doc = self.client.get_statement(year, period)?;
        map_statement(&doc, self.account_index, year, period)
    }
}
