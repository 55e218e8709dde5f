//! The HTTP seam underneath [`RateLimitedFetcher`](super::RateLimitedFetcher).
//!
//! [`Transport`] sends exactly one GET and reports what happened without
//! judging it; retry decisions belong to the fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use snafu::ResultExt;
use thiserror::Error;

use crate::providers::{ClientBuildSnafu, ProviderInitError};

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Rate limiting and server-side failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

/// Why a GET never produced a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection refused/reset, DNS failure, or the body stream broke off.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request itself could not be constructed (bad URL, bad query).
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Connect(_))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one GET to `url` with `query` appended.
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a client whose every request gives up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProviderInitError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context(ClientBuildSnafu)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(RawResponse { status, body })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_builder() {
        TransportError::Invalid(err.to_string())
    } else {
        TransportError::Connect(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        let ok = RawResponse { status: 200, body: String::new() };
        assert!(ok.is_success() && !ok.is_transient());

        for status in [429, 500, 502, 503] {
            let r = RawResponse { status, body: String::new() };
            assert!(r.is_transient(), "{status} should be retried");
        }
        for status in [400, 401, 404] {
            let r = RawResponse { status, body: String::new() };
            assert!(!r.is_transient() && !r.is_success(), "{status} is permanent");
        }
    }

    #[test]
    fn only_network_failures_are_transient() {
        assert!(TransportError::Timeout("t".into()).is_transient());
        assert!(TransportError::Connect("c".into()).is_transient());
        assert!(!TransportError::Invalid("i".into()).is_transient());
    }
}
