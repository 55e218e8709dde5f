//! Rate-limited, retrying access to exchange REST endpoints.
//!
//! [`RateLimitedFetcher`] is the only component that talks to the network. It is
//! stateless apart from an immutable transport handle and a request quota, so one
//! instance is shared (behind an `Arc`) by every source and every sync task.
//!
//! Failures are split into two outcomes:
//! - [`FetchError::Rejected`]: the upstream answered and said no (4xx other than
//!   429, or the request could not be built). Never retried.
//! - [`FetchError::Exhausted`]: every attempt in the [`RetryPolicy`] budget hit a
//!   transient condition (timeout, connection failure, 429, 5xx).

pub mod policy;
pub mod transport;

use std::{num::NonZeroU32, sync::Arc};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use snafu::{Backtrace, Snafu};
use tracing::{debug, warn};

pub use policy::RetryPolicy;
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};

/// Errors surfaced by [`RateLimitedFetcher::fetch`] and the sources built on it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The upstream refused the request itself; retrying cannot help.
    #[snafu(display("{endpoint} rejected the request: {message}"))]
    Rejected {
        endpoint: String,
        status: Option<u16>,
        message: String,
        backtrace: Backtrace,
    },

    /// Transient failures used up the whole attempt budget.
    #[snafu(display("{endpoint} still failing after {attempts} attempts: {last_error}"))]
    Exhausted {
        endpoint: String,
        attempts: u32,
        last_error: String,
        backtrace: Backtrace,
    },
}

impl FetchError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, FetchError::Rejected { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, FetchError::Exhausted { .. })
    }
}

/// Shared outbound HTTP capability with a request quota and bounded retries.
pub struct RateLimitedFetcher {
    transport: Arc<dyn Transport>,
    limiter: DefaultDirectRateLimiter,
    base_url: String,
}

impl RateLimitedFetcher {
    /// `requests_per_second` also sets the burst size.
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        requests_per_second: NonZeroU32,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            limiter: RateLimiter::direct(Quota::per_second(requests_per_second)),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GETs `endpoint` (a path under the base URL), retrying transient failures
    /// according to `policy`.
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        policy: &RetryPolicy,
    ) -> Result<RawResponse, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let budget = policy.attempt_budget.get();
        let mut last_error = String::new();

        for attempt in 1..=budget {
            if let Some(delay) = policy.delay_before(attempt) {
                debug!(endpoint, attempt, ?delay, "backing off before retry");
                tokio::time::sleep(delay).await;
            }
            self.limiter.until_ready().await;

            match self.transport.get(&url, params).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.is_transient() => {
                    warn!(endpoint, attempt, status = response.status, "transient upstream status");
                    last_error = format!("HTTP {}", response.status);
                }
                Ok(response) => {
                    return RejectedSnafu {
                        endpoint,
                        status: Some(response.status),
                        message: format!("HTTP {}: {}", response.status, response.body),
                    }
                    .fail();
                }
                Err(err) if err.is_transient() => {
                    warn!(endpoint, attempt, error = %err, "transient transport failure");
                    last_error = err.to_string();
                }
                Err(err) => {
                    return RejectedSnafu {
                        endpoint,
                        status: None::<u16>,
                        message: err.to_string(),
                    }
                    .fail();
                }
            }
        }

        ExhaustedSnafu {
            endpoint,
            attempts: budget,
            last_error,
        }
        .fail()
    }
}
