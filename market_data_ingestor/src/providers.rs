//! Source abstractions for the two independent upstream feeds.
//!
//! This module defines [`CandleSource`] and [`OpenInterestSource`], the interfaces the
//! synchronizer uses to read one bucket's worth of data. Each concrete exchange
//! (currently [`okx_rest`]) implements both on top of a shared
//! [`RateLimitedFetcher`](crate::fetch::RateLimitedFetcher).
//!
//! Both traits are async and object safe, so callers hold them as
//! `Arc<dyn CandleSource>` and swap in fakes under test.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_data_ingestor::fetch::FetchError;
//! use market_data_ingestor::models::{candle::Candle, interval::Interval};
//! use market_data_ingestor::providers::CandleSource;
//!
//! struct Silent;
//!
//! #[async_trait]
//! impl CandleSource for Silent {
//!     async fn get(
//!         &self,
//!         _instrument: &str,
//!         _interval: Interval,
//!         _bucket_start: i64,
//!     ) -> Result<Option<Candle>, FetchError> {
//!         Ok(None)
//!     }
//!
//!     async fn recent(
//!         &self,
//!         _instrument: &str,
//!         _interval: Interval,
//!         _end_exclusive: i64,
//!         _limit: u32,
//!     ) -> Result<Vec<Candle>, FetchError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod okx_rest;

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};

use crate::{
    fetch::FetchError,
    models::{candle::Candle, interval::Interval, open_interest::OpenInterestReading},
};

/// Reads closed OHLCV buckets.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetches the candle for the bucket starting at `bucket_start`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(candle))` - The upstream has published this exact, closed bucket.
    /// * `Ok(None)` - Nothing for this bucket yet, or only rows for other buckets.
    /// * `Err(FetchError)` - The request was rejected or retries ran out.
    async fn get(
        &self,
        instrument: &str,
        interval: Interval,
        bucket_start: i64,
    ) -> Result<Option<Candle>, FetchError>;

    /// Fetches up to `limit` closed candles that start before `end_exclusive`,
    /// oldest first.
    async fn recent(
        &self,
        instrument: &str,
        interval: Interval,
        end_exclusive: i64,
        limit: u32,
    ) -> Result<Vec<Candle>, FetchError>;
}

/// Reads per-bucket open-interest snapshots.
#[async_trait]
pub trait OpenInterestSource: Send + Sync {
    /// Fetches the reading stamped exactly `bucket_start`; `None` if the upstream has
    /// none for that bucket.
    async fn get(
        &self,
        instrument: &str,
        interval: Interval,
        bucket_start: i64,
    ) -> Result<Option<OpenInterestReading>, FetchError>;

    /// Fetches up to `limit` readings in `[begin, end_exclusive)`, oldest first.
    async fn range(
        &self,
        instrument: &str,
        interval: Interval,
        begin: i64,
        end_exclusive: i64,
        limit: u32,
    ) -> Result<Vec<OpenInterestReading>, FetchError>;
}

/// Errors that can occur while building a provider's HTTP plumbing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },
}
