//! OKX v5 public REST implementation of both sources.
//!
//! Candles come from `GET /api/v5/market/candles`, open interest from
//! `GET /api/v5/rubik/stat/contracts/open-interest-history`. Neither needs an API key.

pub mod params;
pub mod response;

mod candles;
mod open_interest;

pub use candles::OkxCandleSource;
pub use open_interest::OkxOpenInterestSource;

use tracing::warn;

use crate::fetch::{FetchError, RateLimitedFetcher, RejectedSnafu, RetryPolicy};
use response::OkxEnvelope;

pub const DEFAULT_BASE_URL: &str = "https://www.okx.com";
pub const CANDLES_PATH: &str = "/api/v5/market/candles";
pub const OPEN_INTEREST_PATH: &str = "/api/v5/rubik/stat/contracts/open-interest-history";

/// Largest page either endpoint returns in one call.
pub const MAX_PAGE: u32 = 100;

/// Sends the request and unwraps the envelope.
///
/// A body that is not a valid envelope yields no rows: an unparseable answer means
/// "nothing published yet", not a failure. A non-zero business code is a rejection.
async fn fetch_rows(
    fetcher: &RateLimitedFetcher,
    endpoint: &str,
    query: &[(&str, String)],
    policy: &RetryPolicy,
) -> Result<Vec<Vec<String>>, FetchError> {
    let response = fetcher.fetch(endpoint, query, policy).await?;
    let envelope: OkxEnvelope = match serde_json::from_str(&response.body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(endpoint, error = %err, "malformed body, treating as no data");
            return Ok(Vec::new());
        }
    };
    if !envelope.is_ok() {
        return RejectedSnafu {
            endpoint,
            status: Some(response.status),
            message: format!("code {}: {}", envelope.code, envelope.msg),
        }
        .fail();
    }
    Ok(envelope.data)
}

fn unsupported(endpoint: &str, err: params::UnsupportedInterval) -> FetchError {
    RejectedSnafu {
        endpoint,
        status: None::<u16>,
        message: err.to_string(),
    }
    .build()
}
