use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use lib_pollbus::sessions::SessionReport;

/// Body of `POST /start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub symbols: Option<Vec<String>>,
    /// Milliseconds between polls of each symbol.
    pub polling_interval: Option<u64>,
}

impl StartRequest {
    pub fn validate(self) -> Result<(Vec<String>, Duration), String> {
        match (self.symbols, self.polling_interval) {
            (Some(symbols), Some(ms)) if !symbols.is_empty() && ms > 0 => {
                Ok((symbols, Duration::from_millis(ms)))
            }
            _ => Err("Invalid request: please provide both a list of symbols and a polling interval.".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub report: SessionReport,
    pub tick_failures: u64,
}

/// Headers every quote/start response carries.
pub fn cors_json() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::CONTENT_TYPE, "application/json"),
    ]
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, cors_json(), Json(ErrorResponse { error: error.into() })).into_response()
}

/// Parses the upstream base and makes sure path segments can be appended to it.
pub fn parse_upstream(raw: &str) -> Result<Url, url::ParseError> {
    let url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(url::ParseError::RelativeUrlWithoutBase);
    }
    Ok(url)
}

/// `{base}/stock/{symbol}/quote`, with the symbol percent-encoded as one path segment.
pub fn quote_url(base: &Url, symbol: &str) -> Url {
    let mut url = base.clone();
    // parse_upstream already rejected cannot-be-a-base URLs
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend(["stock", symbol, "quote"]);
    }
    url
}

pub fn quote_topic(symbol: &str) -> String {
    format!("T/{}", symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_needs_symbols_and_interval() {
        let ok: StartRequest =
            serde_json::from_str(r#"{"symbols":["AAPL","MSFT"],"pollingInterval":1000}"#).unwrap();
        let (symbols, interval) = ok.validate().unwrap();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(interval, Duration::from_secs(1));

        let missing: StartRequest = serde_json::from_str(r#"{"symbols":["AAPL"]}"#).unwrap();
        assert!(missing.validate().is_err());
        let empty: StartRequest =
            serde_json::from_str(r#"{"symbols":[],"pollingInterval":1000}"#).unwrap();
        assert!(empty.validate().is_err());
        let zero: StartRequest =
            serde_json::from_str(r#"{"symbols":["AAPL"],"pollingInterval":0}"#).unwrap();
        assert!(zero.validate().is_err());
    }

    #[test]
    fn quote_url_encodes_symbol_segment() {
        let base = parse_upstream("https://cloud.iexapis.com/stable/").unwrap();
        assert_eq!(
            quote_url(&base, "BRK/B").as_str(),
            "https://cloud.iexapis.com/stable/stock/BRK%2FB/quote"
        );
        let base = parse_upstream("http://localhost:9000").unwrap();
        assert_eq!(quote_url(&base, "AAPL").as_str(), "http://localhost:9000/stock/AAPL/quote");
    }

    #[test]
    fn upstream_must_be_a_base_url() {
        assert!(parse_upstream("mailto:quotes@example.com").is_err());
        assert!(parse_upstream("stock/AAPL").is_err());
        assert_eq!(quote_topic("AAPL"), "T/AAPL");
    }
}
