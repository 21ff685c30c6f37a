//! Mock Fio API server for testing
//!
//! Serves the two endpoints the adapter uses:
//! - GET /periods/{token}/{from}/{to}/transactions.json
//! - GET /by-id/{token}/{year}/{id}/transactions.json
//!
//! Generates one transaction per day of the requested interval.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value as JsonValue};

use super::mock_http::{MockHttpServer, MockRequest, MockResponse};

pub const VALID_TOKEN: &str = "valid_token";

/// Configuration of the mock
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Answer the first N requests with this status
    pub fail_first: Option<(usize, u16)>,
    /// Statement years that exist; ids 1..=12 exist in each
    pub statement_years: Vec<i32>,
}

pub struct MockFioServer {
    server: MockHttpServer,
}

impl MockFioServer {
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let served = Arc::new(AtomicUsize::new(0));
        let server = MockHttpServer::start(Arc::new(move |req: &MockRequest| {
            let n = served.fetch_add(1, Ordering::SeqCst);
            if let Some((count, status)) = config.fail_first {
                if n < count {
                    return MockResponse::json(status, r#"{"error": "scripted failure"}"#);
                }
            }
            route(req, &config)
        }))?;
        Ok(Self { server })
    }

    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    /// Paths requested so far
    pub fn paths(&self) -> Vec<String> {
        self.server.requests().into_iter().map(|r| r.path).collect()
    }
}

fn route(req: &MockRequest, config: &MockConfig) -> MockResponse {
    if req.method != "GET" {
        return MockResponse::json(405, r#"{"error": "Method not allowed"}"#);
    }

    let parts: Vec<&str> = req.path.trim_start_matches('/').split('/').collect();
    match parts.as_slice() {
        ["periods", token, from, to, "transactions.json"] => {
            if *token != VALID_TOKEN {
                return MockResponse::json(401, "");
            }
            let (Ok(from), Ok(to)) = (
                NaiveDate::parse_from_str(from, "%Y-%m-%d"),
                NaiveDate::parse_from_str(to, "%Y-%m-%d"),
            ) else {
                return MockResponse::json(400, "");
            };
            let body = account_statement(from, to, None);
            MockResponse::json(200, &body.to_string())
        }
        ["by-id", token, year, id, "transactions.json"] => {
            if *token != VALID_TOKEN {
                return MockResponse::json(401, "");
            }
            let year: i32 = year.parse().unwrap_or(0);
            let id: u32 = id.parse().unwrap_or(0);
            if !config.statement_years.contains(&year) || !(1..=12).contains(&id) {
                return MockResponse::json(404, "");
            }
            let from = NaiveDate::from_ymd_opt(year, id, 1).unwrap_or_default();
            let to = from + chrono::Duration::days(2);
            let body = account_statement(from, to, Some((year, id)));
            MockResponse::json(200, &body.to_string())
        }
        _ => MockResponse::json(404, r#"{"error": "Endpoint not found"}"#),
    }
}

/// One 100 CZK incoming payment per day in `from..=to`
fn account_statement(from: NaiveDate, to: NaiveDate, statement: Option<(i32, u32)>) -> JsonValue {
    let mut transactions = Vec::new();
    let mut day = from;
    let mut id = 10_000u64 + from.format("%j").to_string().parse::<u64>().unwrap_or(0) * 10;
    while day <= to {
        transactions.push(json!({
            "column22": {"value": id, "name": "ID pohybu", "id": 22},
            "column0": {"value": format!("{}+0200", day.format("%Y-%m-%d")), "name": "Datum", "id": 0},
            "column1": {"value": 100.0, "name": "Objem", "id": 1},
            "column14": {"value": "CZK", "name": "Měna", "id": 14},
            "column10": {"value": "Mock Counterparty", "name": "Název protiúčtu", "id": 10},
            "column16": {"value": format!("Payment {}", day), "name": "Zpráva pro příjemce", "id": 16},
            "column8": {"value": "Bezhotovostní příjem", "name": "Typ", "id": 8}
        }));
        id += 1;
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    let count = transactions.len() as i64;
    let (opening, closing) = (1000.0, 1000.0 + 100.0 * count as f64);
    let (year_list, id_list) = match statement {
        Some((year, id)) => (json!(year), json!(id)),
        None => (JsonValue::Null, JsonValue::Null),
    };

    json!({
        "accountStatement": {
            "info": {
                "accountId": "2000000000",
                "bankId": "2010",
                "currency": "CZK",
                "iban": "CZ7920100000002000000000",
                "bic": "FIOBCZPPXXX",
                "openingBalance": opening,
                "closingBalance": closing,
                "dateStart": format!("{}+0200", from.format("%Y-%m-%d")),
                "dateEnd": format!("{}+0200", to.format("%Y-%m-%d")),
                "yearList": year_list,
                "idList": id_list
            },
            "transactionList": {"transaction": transactions}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fio::{FioAdapter, FioClient};
    use crate::domain::result::Error;
    use crate::domain::DateRange;
    use crate::ports::BankAdapter;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn adapter(server: &MockFioServer, token: &str) -> FioAdapter {
        FioAdapter::new(
            FioClient::new_with_base_url(token, &server.base_url()).unwrap(),
            0,
        )
    }

    #[test]
    fn test_transactions_use_inclusive_last_day() {
        let server = MockFioServer::start(MockConfig::default()).unwrap();
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 11)).unwrap();

        let txs = adapter(&server, VALID_TOKEN).fetch_transactions(&range).unwrap();

        assert_eq!(
            server.paths(),
            vec!["/periods/valid_token/2013-09-01/2013-09-10/transactions.json"]
        );
        assert_eq!(txs.len(), 10);
        assert_eq!(txs[0].date, date(2013, 9, 1));
        assert_eq!(txs[9].date, date(2013, 9, 10));
        assert_eq!(txs[0].amount, Decimal::new(100, 0));
        assert_eq!(txs[0].counterparty.as_deref(), Some("Mock Counterparty"));
        assert_eq!(txs[0].raw["column8"]["value"], "Bezhotovostní příjem");
    }

    #[test]
    fn test_same_range_twice_gives_same_ids() {
        let server = MockFioServer::start(MockConfig::default()).unwrap();
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 5)).unwrap();
        let fio = adapter(&server, VALID_TOKEN);

        let first: Vec<String> = fio.fetch_transactions(&range).unwrap().into_iter().map(|t| t.id).collect();
        let second: Vec<String> = fio.fetch_transactions(&range).unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_token_is_auth_failure() {
        let server = MockFioServer::start(MockConfig::default()).unwrap();
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 5)).unwrap();

        let err = adapter(&server, "wrong").fetch_transactions(&range).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
    }

    #[test]
    fn test_rate_limit_carries_the_wait() {
        let server = MockFioServer::start(MockConfig {
            fail_first: Some((1, 409)),
            ..Default::default()
        })
        .unwrap();
        let range = DateRange::new(date(2013, 9, 1), date(2013, 9, 5)).unwrap();
        let fio = adapter(&server, VALID_TOKEN);

        let err = fio.fetch_transactions(&range).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(30)));
        assert_eq!(fio.fetch_transactions(&range).unwrap().len(), 4);
    }

    #[test]
    fn test_statement_with_balances() {
        let server = MockFioServer::start(MockConfig {
            statement_years: vec![2013],
            ..Default::default()
        })
        .unwrap();

        let st = adapter(&server, VALID_TOKEN).fetch_statement(2013, 1).unwrap();
        assert_eq!(server.paths(), vec!["/by-id/valid_token/2013/1/transactions.json"]);
        assert_eq!(st.account_id, "2000000000");
        assert_eq!(st.transactions.len(), 3);
        assert_eq!(st.opening_balance, Some(Decimal::new(1000, 0)));
        assert_eq!(st.closing_balance, Some(Decimal::new(1300, 0)));
        assert_eq!(
            st.opening_balance.unwrap() + st.transactions_total(),
            st.closing_balance.unwrap()
        );
    }

    #[test]
    fn test_missing_statement() {
        let server = MockFioServer::start(MockConfig {
            statement_years: vec![2013],
            ..Default::default()
        })
        .unwrap();

        let err = adapter(&server, VALID_TOKEN).fetch_statement(2012, 5).unwrap_err();
        assert!(matches!(err, Error::StatementNotFound { year: 2012, period: 5 }));
    }
}
