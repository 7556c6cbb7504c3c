//! # HTTP Fetcher
//!
//! A thin asynchronous wrapper around `reqwest`. It resolves targets against an
//! optional base URL, appends the static API token as a `token` query
//! parameter, and turns non-2xx answers into `FetchError::Status`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};

use super::{FetchError, FetchResponse, Fetcher};

/// Query parameter carrying the static API token.
const TOKEN_PARAM: &str = "token";

/// `reqwest`-backed [`Fetcher`].
///
/// One instance is shared by every polling task of a session so the
/// connection pool is reused across ticks.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// The underlying client.
    inner: reqwest::Client,
    /// Base URL that relative targets are joined onto.
    base_url: Option<Url>,
    /// Token appended to every request as `?token=...`.
    auth_token: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher.
    ///
    /// # Arguments
    /// * `base_url` - Optional absolute base (e.g. "https://cloud.iexapis.com/stable/").
    ///   Keep the trailing slash, otherwise the last path segment is replaced on join.
    /// * `auth_token` - Optional static token passed as a query parameter.
    pub fn new(base_url: Option<&str>, auth_token: Option<String>) -> Result<Self, FetchError> {
        let base_url = base_url
            .map(|raw| {
                Url::parse(raw).map_err(|source| FetchError::InvalidUrl {
                    target: raw.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            inner: reqwest::Client::new(),
            base_url,
            auth_token,
        })
    }

    /// Rebuilds the client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, FetchError> {
        self.inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(self)
    }

    /// Turns a target into the final request URL.
    pub fn resolve(&self, target: &str) -> Result<Url, FetchError> {
        let invalid = |source| FetchError::InvalidUrl {
            target: target.to_string(),
            source,
        };

        let mut url = match Url::parse(target) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(target).map_err(invalid)?,
                None => return Err(invalid(url::ParseError::RelativeUrlWithoutBase)),
            },
            Err(e) => return Err(invalid(e)),
        };

        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
        }
        Ok(url)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        target: &str,
        method: Method,
        body: Option<serde_json::Value>,
    ) -> Result<FetchResponse, FetchError> {
        let url = self.resolve(target)?;
        let mut req = self.inner.request(method, url);

        // `json` sets the content type for us
        if let Some(b) = body {
            req = req.json(&b);
        }

        let response = req.send().await.map_err(|source| FetchError::Network {
            target: target.to_string(),
            source,
        })?;
        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                target: target.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Body {
            target: target.to_string(),
            source,
        })?;

        Ok(FetchResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_target_ignores_base() {
        let fetcher = HttpFetcher::new(Some("http://base.local/v1/"), None).unwrap();
        let url = fetcher.resolve("http://other.local/stock/AAPL/quote").unwrap();
        assert_eq!(url.as_str(), "http://other.local/stock/AAPL/quote");
    }

    #[test]
    fn relative_target_joins_base_and_appends_token() {
        let fetcher =
            HttpFetcher::new(Some("http://base.local/v1/"), Some("s3cr&t".into())).unwrap();
        let url = fetcher.resolve("stock/MSFT/quote").unwrap();
        assert_eq!(url.as_str(), "http://base.local/v1/stock/MSFT/quote?token=s3cr%26t");
    }

    #[test]
    fn relative_target_without_base_is_rejected() {
        let fetcher = HttpFetcher::new(None, None).unwrap();
        assert!(matches!(
            fetcher.resolve("stock/MSFT/quote"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        assert!(HttpFetcher::new(Some("not a url"), None).is_err());
    }
}
