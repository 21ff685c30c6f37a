//! Mock Citibank web banking for testing
//!
//! Emulates the sign-on forms, the activity download and the statement
//! viewer. The session is tracked with a cookie the same way the real
//! site does it, so requests without the cookie land on the sign-on page.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use super::mock_http::{MockHttpServer, MockRequest, MockResponse};

pub const USERNAME: &str = "jan";
pub const PASSWORD: &str = "secret";
pub const SMS_CODE: &str = "123456";

const SESSION_COOKIE: &str = "JSESSIONID=mock-session";

#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Statements that exist, as (year, month)
    pub statements: Vec<(i32, u32)>,
    /// Every sub-application answers with the sign-on page
    pub session_expired: bool,
}

#[derive(Debug, Default)]
struct State {
    password_accepted: bool,
    logged_in: bool,
    /// fromDate/toDate of the last download setup
    download_window: Option<(NaiveDate, NaiveDate)>,
}

pub struct MockCitibankServer {
    server: MockHttpServer,
}

impl MockCitibankServer {
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let state = Arc::new(Mutex::new(State::default()));
        let server = MockHttpServer::start(Arc::new(move |req: &MockRequest| {
            match state.lock() {
                Ok(mut state) => route(req, &config, &mut state),
                Err(_) => MockResponse::new(500, "text/plain", "state poisoned"),
            }
        }))?;
        Ok(Self { server })
    }

    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.server.requests()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    /// Form of the last request to `path`
    pub fn last_form(&self, path: &str) -> Option<std::collections::HashMap<String, String>> {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.path == path)
            .map(|r| r.form())
    }
}

fn signon_page(token: &str) -> String {
    format!(
        r#"<html><body><form name="SignonForm" action="ProcessUsernameSignon.do">
<input type="hidden" name="SYNC_TOKEN" value="{}"/>
<input name="username"/><input type="password" name="password"/>
</form></body></html>"#,
        token
    )
}

fn has_session(req: &MockRequest) -> bool {
    req.header("cookie")
        .map(|c| c.contains(SESSION_COOKIE))
        .unwrap_or(false)
}

fn route(req: &MockRequest, config: &MockConfig, state: &mut State) -> MockResponse {
    let form = req.form();
    let field = |name: &str| form.get(name).map(|s| s.as_str()).unwrap_or("");

    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/JSO/signon/DisplayUsernameSignon.do") => {
            *state = State::default();
            MockResponse::html(&signon_page("tok1"))
                .with_header("Set-Cookie", &format!("{}; Path=/", SESSION_COOKIE))
        }
        ("POST", "/JSO/signon/ProcessUsernameSignon.do") => {
            if !has_session(req) || field("SYNC_TOKEN") != "tok1" {
                return MockResponse::html(&signon_page("tok1"));
            }
            if field("username") != USERNAME || field("password") != PASSWORD {
                return MockResponse::html("<html>Litujeme, zadané údaje nejsou správné.</html>");
            }
            state.password_accepted = true;
            MockResponse::html(
                r#"<html><form name="OtpForm"><input type="hidden" name="SYNC_TOKEN" value="tok2"/>Zadejte SMS kód</form></html>"#,
            )
        }
        ("POST", "/JPS/apps/otpstc/StcMain.do") => {
            if !state.password_accepted || field("SYNC_TOKEN") != "tok2" {
                return MockResponse::html(&signon_page("tok1"));
            }
            if field("secureTxnCode") != SMS_CODE {
                return MockResponse::html("<html>Neplatný kód.</html>");
            }
            state.logged_in = true;
            MockResponse::html("<html><h1>Vítejte v Citibank Online</h1></html>")
        }
        (_, path) if !state.logged_in || !has_session(req) => {
            if path.ends_with("InitializeSubApp.do") {
                MockResponse::html(&signon_page("tok1"))
            } else {
                MockResponse::new(403, "text/html", "<html>Forbidden</html>")
            }
        }
        ("POST", "/jba/daa/InitializeSubApp.do") => {
            if config.session_expired || field("TTC") != "264" {
                return MockResponse::html(&signon_page("tok1"));
            }
            MockResponse::html(r#"<html><form name="DownloadForm"></form></html>"#)
        }
        ("POST", "/jba/daa/startdownloadActivity.do") => {
            let from = NaiveDate::parse_from_str(field("fromDate"), "%d/%m/%Y");
            let to = NaiveDate::parse_from_str(field("toDate"), "%d/%m/%Y");
            match (from, to) {
                (Ok(from), Ok(to)) => {
                    state.download_window = Some((from, to));
                    MockResponse::html("<html>OK</html>")
                }
                _ => MockResponse::new(400, "text/html", "<html>Bad date</html>"),
            }
        }
        ("POST", "/jba/daa/downloadActivity.do") => MockResponse::html("<html>Preparing</html>"),
        ("POST", "/jba/daa/Opendownload.do") => match state.download_window {
            Some((from, to)) => MockResponse::new(
                200,
                "application/csv;charset=UTF-8",
                activity_csv(from, to),
            ),
            None => MockResponse::html("<html>Nothing to download</html>"),
        },
        ("GET", "/cba/estmtview/InitializeSubApp.do")
        | ("POST", "/cba/estmtview/FireListqMsg.do")
        | ("POST", "/cba/estmtview/BuildStatementDates.do")
        | ("POST", "/cba/estmtview/FireVwstqMsg.do") => {
            MockResponse::html("<html><form name=\"StatementForm\"></form></html>")
        }
        ("POST", "/cba/estmtview/DisplayStatementAction.do") => {
            let year: i32 = field("selectedYear").parse().unwrap_or(0);
            let month: u32 = field("statementDateIndex").parse().unwrap_or(0);
            if config.statements.contains(&(year, month)) {
                MockResponse::new(
                    200,
                    "application/pdf",
                    format!("%PDF-1.4 statement {}/{}", year, month),
                )
            } else {
                MockResponse::html("<html>Výpis není k dispozici</html>")
            }
        }
        _ => MockResponse::new(404, "text/html", "<html>Not found</html>"),
    }
}

/// One 50 CZK card payment per day in `from..=to`
fn activity_csv(from: NaiveDate, to: NaiveDate) -> String {
    let mut csv = String::from("Datum;Popis;Částka;Měna\n");
    let mut day = from;
    while day <= to {
        csv.push_str(&format!(
            "{};Platba kartou {};-50,00;CZK\n",
            day.format("%d/%m/%Y"),
            day.format("%d.%m.")
        ));
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;

    use crate::adapters::citibank::{
        CitibankClient, CitibankCzAdapter, SecretPrompt, CITIBANK_SESSION_FILE,
    };
    use crate::domain::result::Error;
    use crate::domain::DateRange;
    use crate::ports::BankAdapter;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Answers with `secret` and counts how often it was asked
    fn prompt(secret: &str, calls: Arc<AtomicUsize>) -> SecretPrompt {
        let secret = secret.to_string();
        Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(secret.clone())
        })
    }

    fn client(
        server: &MockCitibankServer,
        password: &str,
        code: &str,
        calls: Arc<AtomicUsize>,
    ) -> CitibankClient {
        CitibankClient::new_with_base_url(
            USERNAME,
            prompt(password, Arc::new(AtomicUsize::new(0))),
            prompt(code, calls),
            &server.base_url(),
        )
        .unwrap()
    }

    fn adapter(
        server: &MockCitibankServer,
        password: &str,
        code: &str,
        calls: Arc<AtomicUsize>,
    ) -> CitibankCzAdapter {
        CitibankCzAdapter::new(client(server, password, code, calls), 0)
    }

    #[test]
    fn test_login_and_download() {
        let server = MockCitibankServer::start(MockConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let citi = adapter(&server, PASSWORD, SMS_CODE, calls.clone());
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 4)).unwrap();

        let txs = citi.fetch_transactions(&range).unwrap();

        assert_eq!(txs.len(), 3);
        assert_eq!(txs[0].date, date(2013, 9, 1));
        assert_eq!(txs[2].date, date(2013, 9, 3));
        assert_eq!(txs[0].amount, Decimal::new(-5000, 2));
        assert_eq!(txs[0].currency, "CZK");
        assert_eq!(txs[0].description.as_deref(), Some("Platba kartou 01.09."));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let setup = server.last_form("/jba/daa/startdownloadActivity.do").unwrap();
        assert_eq!(setup["fromDate"], "01/09/2013");
        assert_eq!(setup["toDate"], "03/09/2013");
        assert_eq!(setup["selectedAccountsInForm"], "0");
        assert_eq!(setup["selectedDownloadFormat"], "5");
    }

    #[test]
    fn test_session_is_reused() {
        let server = MockCitibankServer::start(MockConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let citi = adapter(&server, PASSWORD, SMS_CODE, calls.clone());
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 3)).unwrap();

        let first: Vec<String> = citi.fetch_transactions(&range).unwrap().into_iter().map(|t| t.id).collect();
        let second: Vec<String> = citi.fetch_transactions(&range).unwrap().into_iter().map(|t| t.id).collect();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.count("/JSO/signon/DisplayUsernameSignon.do"), 1);
    }

    #[test]
    fn test_wrong_password() {
        let server = MockCitibankServer::start(MockConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let citi = adapter(&server, "nope", SMS_CODE, calls.clone());
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 3)).unwrap();

        let err = citi.fetch_transactions(&range).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wrong_sms_code() {
        let server = MockCitibankServer::start(MockConfig::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let citi = adapter(&server, PASSWORD, "000000", calls.clone());
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 3)).unwrap();

        let err = citi.fetch_transactions(&range).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
        assert!(!err.is_retryable());
        assert_eq!(server.count("/jba/daa/InitializeSubApp.do"), 0);
    }

    #[test]
    fn test_expired_session() {
        let server = MockCitibankServer::start(MockConfig {
            session_expired: true,
            ..Default::default()
        })
        .unwrap();
        let citi = adapter(&server, PASSWORD, SMS_CODE, Arc::new(AtomicUsize::new(0)));
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 3)).unwrap();

        let err = citi.fetch_transactions(&range).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(ref m) if m.contains("expired")));
    }

    #[test]
    fn test_statement_pdf() {
        let server = MockCitibankServer::start(MockConfig {
            statements: vec![(2013, 9)],
            ..Default::default()
        })
        .unwrap();
        let citi = adapter(&server, PASSWORD, SMS_CODE, Arc::new(AtomicUsize::new(0)));

        let st = citi.fetch_statement(2013, 9).unwrap();
        let doc = st.document.unwrap();
        assert_eq!(doc.content_type, "application/pdf");
        assert!(doc.bytes.starts_with(b"%PDF"));
        assert!(st.transactions.is_empty());

        let form = server.last_form("/cba/estmtview/DisplayStatementAction.do").unwrap();
        assert_eq!(form["selectedAccountIndex"], "1");
        assert_eq!(form["selectedYear"], "2013");
        assert_eq!(form["statementDateIndex"], "9");
    }

    #[test]
    fn test_statement_missing() {
        let server = MockCitibankServer::start(MockConfig {
            statements: vec![(2013, 9)],
            ..Default::default()
        })
        .unwrap();
        let citi = adapter(&server, PASSWORD, SMS_CODE, Arc::new(AtomicUsize::new(0)));

        let err = citi.fetch_statement(2013, 8).unwrap_err();
        assert!(matches!(err, Error::StatementNotFound { year: 2013, period: 8 }));
    }

    #[test]
    fn test_saved_session_skips_sign_on() {
        let server = MockCitibankServer::start(MockConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join(CITIBANK_SESSION_FILE);
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 3)).unwrap();

        let sms_calls = Arc::new(AtomicUsize::new(0));
        let first = client(&server, PASSWORD, SMS_CODE, sms_calls.clone()).with_session_file(&session);
        CitibankCzAdapter::new(first, 0).fetch_transactions(&range).unwrap();
        assert!(session.exists());
        assert_eq!(sms_calls.load(Ordering::SeqCst), 1);

        // Next run: no password, no SMS code
        let password_calls = Arc::new(AtomicUsize::new(0));
        let second = CitibankClient::new_with_base_url(
            USERNAME,
            prompt(PASSWORD, password_calls.clone()),
            prompt(SMS_CODE, sms_calls.clone()),
            &server.base_url(),
        )
        .unwrap()
        .with_session_file(&session);
        let txs = CitibankCzAdapter::new(second, 0).fetch_transactions(&range).unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(password_calls.load(Ordering::SeqCst), 0);
        assert_eq!(sms_calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.count("/JSO/signon/DisplayUsernameSignon.do"), 1);
    }

    #[test]
    fn test_dead_saved_session_signs_on_again() {
        let server = MockCitibankServer::start(MockConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join(CITIBANK_SESSION_FILE);
        std::fs::write(
            &session,
            format!(r#"{{"username":"{}","cookies":"JSESSIONID=stale"}}"#, USERNAME),
        )
        .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let citi = CitibankCzAdapter::new(
            client(&server, PASSWORD, SMS_CODE, calls.clone()).with_session_file(&session),
            0,
        );
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 2)).unwrap();
        assert_eq!(citi.fetch_transactions(&range).unwrap().len(), 1);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let saved = std::fs::read_to_string(&session).unwrap();
        assert!(saved.contains("mock-session"));
    }

    #[test]
    fn test_expired_session_is_forgotten() {
        let server = MockCitibankServer::start(MockConfig {
            session_expired: true,
            ..Default::default()
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join(CITIBANK_SESSION_FILE);
        let citi = CitibankCzAdapter::new(
            client(&server, PASSWORD, SMS_CODE, Arc::new(AtomicUsize::new(0)))
                .with_session_file(&session),
            0,
        );
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 2)).unwrap();

        assert!(citi.fetch_transactions(&range).is_err());
        assert!(!session.exists());
    }
}
