//! Citibank Europe (CZ) internet banking client
//!
//! Citibank has no API. The client drives the web banking forms the way a
//! browser does: sign on with username and password, confirm with an SMS
//! code, then request an activity download or a PDF statement.
//!
//! The bank keeps a signed-on session alive for a few minutes. Its cookies
//! are saved to a session file so the next run can skip the password and
//! SMS code while the session lasts.
//!
//! The activity download is a CSV export which is mapped into the domain
//! model here. Citibank assigns no transaction ids, so ids are derived from
//! the row contents.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::result::{Error, Result};
use crate::domain::{BankKind, DateRange, Statement, StatementDocument, Transaction};
use crate::ports::{BankAdapter, OutputFormat};

/// Default production URL
const CITIBANK_PRODUCTION_URL: &str = "https://production.citibank.cz/CZGCB";

/// Environment variable to override the Citibank base URL
pub const CITIBANK_BASE_URL_ENV: &str = "IBANK_CITIBANK_BASE_URL";

/// Session file inside the ibank directory
pub const CITIBANK_SESSION_FILE: &str = "citibankcz.state";

pub const CITIBANK_DEFAULT_WINDOW_DAYS: i64 = 30;

const REQUEST_TIMEOUT_SECS: u64 = 60;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:24.0) Gecko/20100101 Firefox/24.0";

/// Activity download format id for CSV
const DOWNLOAD_FORMAT_CSV: u32 = 5;

/// Transaction list service code of the activity download sub-application
const ACTIVITY_TTC: &str = "264";

const DEFAULT_CURRENCY: &str = "CZK";

/// Get the Citibank base URL, checking the environment variable first
pub fn get_base_url() -> String {
    std::env::var(CITIBANK_BASE_URL_ENV).unwrap_or_else(|_| CITIBANK_PRODUCTION_URL.to_string())
}

/// Asks the user for a secret (password, SMS code); only called when a
/// fresh sign-on is needed
pub type SecretPrompt = Box<dyn Fn() -> Result<String> + Send + Sync>;

fn sync_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"name="SYNC_TOKEN" value="(\w+)""#).expect("valid SYNC_TOKEN pattern")
    })
}

fn welcome_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"V.tejte").expect("valid welcome pattern"))
}

fn extract_sync_token(page: &str) -> Result<String> {
    sync_token_regex()
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::invalid_response("Failed to extract SYNC_TOKEN"))
}

fn map_request_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::upstream(format!(
            "Connection to Citibank timed out after {} seconds",
            REQUEST_TIMEOUT_SECS
        ))
    } else if error.is_connect() {
        Error::upstream("Unable to connect to Citibank servers")
    } else {
        Error::upstream(format!("Citibank request failed: {}", error.without_url()))
    }
}

fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// What a session file holds: the cookies of a signed-on session
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedSession {
    username: String,
    /// `name=value; name=value` as sent to the bank
    cookies: String,
}

/// Citibank web banking client
pub struct CitibankClient {
    client: Client,
    cookies: Arc<Jar>,
    base_url: String,
    site: Url,
    username: String,
    password: SecretPrompt,
    sms_code: SecretPrompt,
    session_file: Option<PathBuf>,
    logged_in: Mutex<bool>,
}

impl CitibankClient {
    pub fn new(username: &str, password: SecretPrompt, sms_code: SecretPrompt) -> Result<Self> {
        Self::new_with_base_url(username, password, sms_code, &get_base_url())
    }

    pub fn new_with_base_url(
        username: &str,
        password: SecretPrompt,
        sms_code: SecretPrompt,
        base_url: &str,
    ) -> Result<Self> {
        if username.trim().is_empty() {
            return Err(Error::Config("Citibank username cannot be empty".to_string()));
        }

        let base_url = base_url.trim_end_matches('/').to_string();
        let site = Url::parse(&format!("{}/", base_url))
            .map_err(|e| Error::Config(format!("Invalid Citibank URL {}: {}", base_url, e)))?;

        let cookies = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(cookies.clone())
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cookies,
            base_url,
            site,
            username: username.trim().to_string(),
            password,
            sms_code,
            session_file: None,
            logged_in: Mutex::new(false),
        })
    }

    /// Keep the signed-on session in `path` across runs
    pub fn with_session_file(mut self, path: &Path) -> Self {
        self.session_file = Some(path.to_path_buf());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn check_status(response: Response, what: &str) -> Result<Response> {
        match response.status().as_u16() {
            200 => Ok(response),
            status => Err(Error::upstream(format!("{} failed: HTTP {}", what, status))),
        }
    }

    fn get(&self, path: &str, what: &str) -> Result<Response> {
        tracing::debug!(path, "citibank request");
        let response = self
            .client
            .get(self.url(path))
            .send()
            .map_err(map_request_error)?;
        Self::check_status(response, what)
    }

    fn post_form(&self, path: &str, form: &[(&str, String)], what: &str) -> Result<Response> {
        tracing::debug!(path, "citibank request");
        let response = self
            .client
            .post(self.url(path))
            .form(form)
            .send()
            .map_err(map_request_error)?;
        Self::check_status(response, what)
    }

    fn text(response: Response) -> Result<String> {
        response
            .text()
            .map_err(|e| Error::upstream(format!("Failed to read Citibank response: {}", e.without_url())))
    }

    /// Sign on unless this client, or a saved session, already holds one
    fn ensure_logged_in(&self) -> Result<()> {
        let mut logged_in = self
            .logged_in
            .lock()
            .map_err(|e| Error::upstream(format!("Lock poisoned: {}", e)))?;
        if !*logged_in {
            if self.resume_session()? {
                tracing::debug!("resumed saved citibank session");
            } else {
                self.login()?;
                self.save_session();
            }
            *logged_in = true;
        }
        Ok(())
    }

    fn mark_logged_out(&self) {
        if let Ok(mut logged_in) = self.logged_in.lock() {
            *logged_in = false;
        }
        self.discard_session();
    }

    /// Load the saved cookies and check the bank still honours them
    fn resume_session(&self) -> Result<bool> {
        let Some(path) = &self.session_file else {
            return Ok(false);
        };
        let saved: SavedSession = match std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
        {
            Some(saved) => saved,
            None => return Ok(false),
        };
        if saved.username != self.username {
            return Ok(false);
        }

        for pair in saved.cookies.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            self.cookies.add_cookie_str(&format!("{}; Path=/", pair), &self.site);
        }
        if self.session_alive()? {
            return Ok(true);
        }
        self.discard_session();
        Ok(false)
    }

    /// A live session opens the activity sub-application; a dead one gets the sign-on form
    fn session_alive(&self) -> Result<bool> {
        let page = Self::text(self.post_form(
            "jba/daa/InitializeSubApp.do",
            &[("TTC", ACTIVITY_TTC.to_string())],
            "Session check",
        )?)?;
        Ok(!page.contains("SignonForm"))
    }

    /// A session that can't be saved only costs a new sign-on next time
    fn save_session(&self) {
        let Some(path) = &self.session_file else {
            return;
        };
        let Some(cookies) = self
            .cookies
            .cookies(&self.site)
            .and_then(|v| v.to_str().ok().map(str::to_string))
        else {
            return;
        };
        let saved = SavedSession {
            username: self.username.clone(),
            cookies,
        };
        if let Err(e) = write_private(path, &saved) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save citibank session");
        }
    }

    fn discard_session(&self) {
        if let Some(path) = &self.session_file {
            let _ = std::fs::remove_file(path);
        }
    }

    /// Username/password sign-on followed by SMS code confirmation
    fn login(&self) -> Result<()> {
        let password = (self.password)()?;
        let page = Self::text(self.get("JSO/signon/DisplayUsernameSignon.do", "Sign-on page")?)?;
        let sync_token = extract_sync_token(&page)?;

        let form = [
            ("SYNC_TOKEN", sync_token),
            ("username", self.username.clone()),
            ("password", password),
            ("x", "0".to_string()),
            ("y", "0".to_string()),
            ("smsLoginCheck", "true".to_string()),
        ];
        let page = Self::text(self.post_form("JSO/signon/ProcessUsernameSignon.do", &form, "Sign-on")?)?;
        if page.contains("Litujeme") {
            return Err(Error::auth("Wrong username or password"));
        }
        let sync_token = extract_sync_token(&page)?;

        let code = (self.sms_code)()?;
        let form = [
            ("SYNC_TOKEN", sync_token),
            ("secureTxnFunction", "CodeEntry".to_string()),
            ("secureTxnCode", code.trim().to_string()),
        ];
        let page = Self::text(self.post_form("JPS/apps/otpstc/StcMain.do", &form, "SMS code entry")?)?;
        if !welcome_regex().is_match(&page) {
            return Err(Error::auth("Wrong SMS code"));
        }

        tracing::debug!("citibank sign-on complete");
        Ok(())
    }

    /// Download the activity CSV for an inclusive date interval
    pub fn download_activity_csv(
        &self,
        account_index: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String> {
        self.ensure_logged_in()?;

        let page = Self::text(self.post_form(
            "jba/daa/InitializeSubApp.do",
            &[("TTC", ACTIVITY_TTC.to_string())],
            "Initialize activity download",
        )?)?;
        if page.contains("SignonForm") {
            self.mark_logged_out();
            return Err(Error::auth("Citibank session expired"));
        }

        let form = [
            ("MISCalendarActivity", "3".to_string()),
            ("cmd", "process".to_string()),
            ("ruleValueforPreSelect", "false".to_string()),
            ("ruleValueforAccountSel", "false".to_string()),
            (
                "selectAnAcctPhrase",
                "Zaškrtněte účty, pro které si chcete uložit přehled pohybů.".to_string(),
            ),
            ("warnStatus", "true".to_string()),
            ("endDateOption", "1".to_string()),
            ("forAccount", "Selected".to_string()),
            ("selectedAccountsInForm", account_index.to_string()),
            ("selectedDownloadType", "1".to_string()),
            ("selectedDownloadFormat", DOWNLOAD_FORMAT_CSV.to_string()),
            ("saveActivityFor", "DateDownload".to_string()),
            ("fromDate", from.format("%d/%m/%Y").to_string()),
            ("toDate", to.format("%d/%m/%Y").to_string()),
        ];
        self.post_form("jba/daa/startdownloadActivity.do", &form, "Activity download setup")?;

        let xyz = [("xyz", String::new())];
        self.post_form("jba/daa/downloadActivity.do", &xyz, "Activity download init")?;
        let response = self.post_form("jba/daa/Opendownload.do", &xyz, "Activity download")?;

        let ctype = content_type(&response);
        if !ctype.starts_with("application/csv") {
            return Err(Error::upstream(format!(
                "Unexpected content-type of activity download: {}",
                ctype
            )));
        }
        Self::text(response)
    }

    /// Download a statement document. Returns the content type and bytes.
    pub fn download_statement(
        &self,
        account_index: u32,
        year: i32,
        period: u32,
    ) -> Result<(String, Vec<u8>)> {
        self.ensure_logged_in()?;

        let account = (account_index + 1).to_string();
        self.get("cba/estmtview/InitializeSubApp.do", "Initialize statements")?;

        let mut form = vec![
            ("selectedAccountIndex", account),
            ("pdfSupportedByBrowser", "false".to_string()),
            ("pdfDisplay", "Inline".to_string()),
            ("warnStatus", "true".to_string()),
        ];
        self.post_form("cba/estmtview/FireListqMsg.do", &form, "Statement account selection")?;

        form.push(("selectedYear", year.to_string()));
        self.post_form("cba/estmtview/BuildStatementDates.do", &form, "Statement year selection")?;

        let form = [
            ("selectedAccountIndex", (account_index + 1).to_string()),
            ("selectedYear", year.to_string()),
            ("statementDateIndex", period.to_string()),
            ("pdfSupportedByBrowser", "true".to_string()),
            ("pdfDisplay", "Attachment".to_string()),
            ("warnStatus", "false".to_string()),
        ];
        self.post_form("cba/estmtview/FireVwstqMsg.do", &form, "Statement selection")?;
        let response =
            self.post_form("cba/estmtview/DisplayStatementAction.do", &form, "Statement download")?;

        let ctype = content_type(&response);
        let bytes = response
            .bytes()
            .map_err(|e| Error::upstream(format!("Failed to read statement: {}", e.without_url())))?;
        Ok((ctype, bytes.to_vec()))
    }
}

/// Session cookies are credentials: owner-only on unix
fn write_private(path: &Path, session: &SavedSession) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(&serde_json::to_vec(session)?)?;
    Ok(())
}

/// Which CSV column holds what
#[derive(Debug)]
struct ColumnMap {
    names: Vec<String>,
    date: usize,
    amount: usize,
    currency: Option<usize>,
    description: Option<usize>,
    counterparty: Option<usize>,
}

impl ColumnMap {
    /// Recognize a header row, Czech or English
    fn from_header(header: &StringRecord) -> Option<Self> {
        let names: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
        let find = |candidates: &[&str]| {
            names.iter().position(|n| {
                let n = n.to_lowercase();
                candidates.iter().any(|c| n.contains(c))
            })
        };

        let date = find(&["datum", "date"])?;
        let amount = find(&["částka", "castka", "amount", "objem"])?;
        let currency = find(&["měna", "mena", "currency"]);
        let description = find(&["popis", "description", "zpráva", "memo"]);
        let counterparty = find(&["protistrana", "protiúčet", "příjemce", "payee", "counterparty"]);

        Some(Self {
            names,
            date,
            amount,
            currency,
            description,
            counterparty,
        })
    }

    /// Headerless export: date, description, amount[, ...]
    fn positional(width: usize) -> Self {
        Self {
            names: (0..width).map(|i| format!("column{}", i)).collect(),
            date: 0,
            amount: 2,
            currency: None,
            description: Some(1),
            counterparty: None,
        }
    }

    fn field<'r>(record: &'r StringRecord, index: Option<usize>) -> Option<&'r str> {
        index
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn map(
        &self,
        record: &StringRecord,
        account_index: u32,
        occurrences: &mut HashMap<String, usize>,
    ) -> Result<Transaction> {
        let date_text = Self::field(record, Some(self.date))
            .ok_or_else(|| Error::invalid_response("Citibank row without a date"))?;
        let date = parse_date(date_text).ok_or_else(|| {
            Error::invalid_response(format!("Unrecognized Citibank date: {}", date_text))
        })?;
        let amount_text = Self::field(record, Some(self.amount))
            .ok_or_else(|| Error::invalid_response("Citibank row without an amount"))?;
        let amount = parse_amount(amount_text).ok_or_else(|| {
            Error::invalid_response(format!("Unrecognized Citibank amount: {}", amount_text))
        })?;
        let currency = Self::field(record, self.currency).unwrap_or(DEFAULT_CURRENCY);
        let description = Self::field(record, self.description).map(str::to_string);
        let counterparty = Self::field(record, self.counterparty).map(str::to_string);

        let base = Transaction::fingerprint(
            account_index,
            date,
            amount,
            currency,
            description.as_deref(),
            counterparty.as_deref(),
            0,
        );
        let occurrence = occurrences.entry(base).or_insert(0);
        *occurrence += 1;
        let id = Transaction::fingerprint(
            account_index,
            date,
            amount,
            currency,
            description.as_deref(),
            counterparty.as_deref(),
            *occurrence,
        );

        let raw: Map<String, JsonValue> = self
            .names
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.clone(), JsonValue::String(value.to_string())))
            .collect();

        let mut tx = Transaction::new(id, date, amount, currency);
        tx.description = description;
        tx.counterparty = counterparty;
        tx.raw = JsonValue::Object(raw);
        Ok(tx)
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    ["%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Amounts come as "-1 234,50", "-1,234.50" or "1234.50 CZK"
fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | ','))
        .collect();
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };
    normalized.parse().ok()
}

/// Parse the activity CSV export
fn parse_activity_csv(text: &str, account_index: u32) -> Result<Vec<Transaction>> {
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let first_line = text.lines().next().unwrap_or("");
    let delimiter = if first_line.matches(';').count() > first_line.matches(',').count() {
        b';'
    } else {
        b','
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let first = match records.next() {
        Some(record) => record?,
        None => return Ok(Vec::new()),
    };
    let (columns, first_row) = match ColumnMap::from_header(&first) {
        Some(columns) => (columns, None),
        None => (ColumnMap::positional(first.len()), Some(first)),
    };

    let mut occurrences = HashMap::new();
    let mut transactions = Vec::new();
    for record in first_row.into_iter().map(Ok::<_, csv::Error>).chain(records) {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        transactions.push(columns.map(&record, account_index, &mut occurrences)?);
    }

    Transaction::sort(&mut transactions);
    Ok(transactions)
}

/// Citibank CZ bank adapter
pub struct CitibankCzAdapter {
    client: CitibankClient,
    account_index: u32,
}

impl CitibankCzAdapter {
    pub fn new(client: CitibankClient, account_index: u32) -> Self {
        Self {
            client,
            account_index,
        }
    }
}

impl BankAdapter for CitibankCzAdapter {
    fn kind(&self) -> BankKind {
        BankKind::CitibankCz
    }

    fn supports_statements(&self) -> bool {
        true
    }

    fn requires_token(&self) -> bool {
        false
    }

    /// Statements only come as PDF
    fn statement_format(&self) -> Option<OutputFormat> {
        Some(OutputFormat::Pdf)
    }

    fn default_range(&self, today: NaiveDate) -> DateRange {
        DateRange::last_days(today, CITIBANK_DEFAULT_WINDOW_DAYS)
    }

    fn fetch_transactions(&self, range: &DateRange) -> Result<Vec<Transaction>> {
        let last_day = match range.last_day() {
            Some(day) => day,
            None => return Ok(Vec::new()),
        };

        let csv = self
            .client
            .download_activity_csv(self.account_index, range.start(), last_day)?;
        let transactions: Vec<Transaction> = parse_activity_csv(&csv, self.account_index)?
            .into_iter()
            .filter(|t| range.contains(t.date))
            .collect();

        tracing::debug!(count = transactions.len(), %range, "citibank transactions fetched");
        Ok(transactions)
    }

    /// Statements are monthly; `period` is the month
    fn fetch_statement(&self, year: i32, period: u32) -> Result<Statement> {
        if !(1..=12).contains(&period) {
            return Err(Error::StatementNotFound { year, period });
        }

        let (content_type, bytes) = self
            .client
            .download_statement(self.account_index, year, period)?;
        if !content_type.starts_with("application/pdf") {
            tracing::debug!(%content_type, year, period, "statement not offered as pdf");
            return Err(Error::StatementNotFound { year, period });
        }

        let mut statement = Statement::new(self.account_index.to_string(), year, period);
        statement.document = Some(StatementDocument {
            content_type: "application/pdf".to_string(),
            bytes,
        });
        Ok(statement)
    }
}
