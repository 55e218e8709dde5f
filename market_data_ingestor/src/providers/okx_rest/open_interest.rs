use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    fetch::{FetchError, RateLimitedFetcher, RetryPolicy},
    models::{interval::Interval, open_interest::OpenInterestReading},
    providers::{
        OpenInterestSource,
        okx_rest::{
            MAX_PAGE, OPEN_INTEREST_PATH, fetch_rows,
            params::{open_interest_period, open_interest_query},
            response::open_interest_from_row,
            unsupported,
        },
    },
};

pub struct OkxOpenInterestSource {
    fetcher: Arc<RateLimitedFetcher>,
    policy: RetryPolicy,
}

impl OkxOpenInterestSource {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, policy: RetryPolicy) -> Self {
        Self { fetcher, policy }
    }

    async fn window(
        &self,
        instrument: &str,
        interval: Interval,
        begin: i64,
        end: i64,
        limit: u32,
    ) -> Result<Vec<OpenInterestReading>, FetchError> {
        let period =
            open_interest_period(interval).map_err(|e| unsupported(OPEN_INTEREST_PATH, e))?;
        let query = open_interest_query(instrument, &period, begin, end, limit.clamp(1, MAX_PAGE));
        let rows = fetch_rows(&self.fetcher, OPEN_INTEREST_PATH, &query, &self.policy).await?;
        Ok(rows
            .iter()
            .filter_map(|row| open_interest_from_row(row))
            .collect())
    }
}

#[async_trait]
impl OpenInterestSource for OkxOpenInterestSource {
    async fn get(
        &self,
        instrument: &str,
        interval: Interval,
        bucket_start: i64,
    ) -> Result<Option<OpenInterestReading>, FetchError> {
        // `end` may be inclusive upstream, so the next bucket's reading can come
        // back first; two rows and an exact match cover both cases.
        let end = bucket_start + interval.length_ms();
        let readings = self.window(instrument, interval, bucket_start, end, 2).await?;
        Ok(readings.into_iter().find(|r| r.bucket_start == bucket_start))
    }

    async fn range(
        &self,
        instrument: &str,
        interval: Interval,
        begin: i64,
        end_exclusive: i64,
        limit: u32,
    ) -> Result<Vec<OpenInterestReading>, FetchError> {
        let mut readings = self
            .window(instrument, interval, begin, end_exclusive, limit)
            .await?;
        readings.retain(|r| (begin..end_exclusive).contains(&r.bucket_start));
        readings.sort_by_key(|r| r.bucket_start);
        readings.dedup_by_key(|r| r.bucket_start);
        Ok(readings)
    }
}
