//! # Data Retrieval Module
//!
//! One-shot HTTP retrieval for the polling sessions. The `Fetcher` trait is the
//! seam the sessions depend on; `HttpFetcher` is the `reqwest` implementation.
//!
//! A fetch never retries on its own. A polling session simply tries again on
//! its next tick.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// The `reqwest`-backed fetcher.
pub mod http_fetcher;

pub use http_fetcher::HttpFetcher;
pub use reqwest::Method;

/// A successful (2xx) HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The numeric HTTP status code.
    pub status: u16,
    /// The headers returned by the server.
    pub headers: HeaderMap,
    /// The raw response body.
    pub body: Bytes,
}

impl FetchResponse {
    /// Builds a `200 OK` response around a body. Mostly useful for fakes.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// The body as UTF-8 text. Invalid sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Reasons a single fetch can fail.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The target could not be turned into an absolute URL.
    #[error("invalid target '{target}': {source}")]
    InvalidUrl {
        /// The offending target.
        target: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },

    /// Connection, DNS, TLS or timeout failure.
    #[error("request to '{target}' failed: {source}")]
    Network {
        /// The requested target.
        target: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("'{target}' answered {status}: {body}")]
    Status {
        /// The requested target.
        target: String,
        /// HTTP status code.
        status: u16,
        /// Error body, possibly empty.
        body: String,
    },

    /// The response body could not be read.
    #[error("reading body from '{target}' failed: {source}")]
    Body {
        /// The requested target.
        target: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client itself could not be built.
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),
}

/// Issues a single HTTP request.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `target` with `method`, sending `body` as JSON when present.
    ///
    /// Non-2xx answers are errors; the caller decides what a failure means.
    async fn fetch(
        &self,
        target: &str,
        method: Method,
        body: Option<serde_json::Value>,
    ) -> Result<FetchResponse, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_replaces_invalid_utf8() {
        let resp = FetchResponse::ok(vec![b'o', b'k', 0xff]);
        assert_eq!(resp.text(), "ok\u{fffd}");
    }

    #[test]
    fn json_decodes_body() {
        let resp = FetchResponse::ok(r#"{"symbol":"AAPL","latestPrice":1.5}"#);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["symbol"], "AAPL");
    }
}
