use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    fetch::{FetchError, RateLimitedFetcher, RetryPolicy},
    models::{candle::Candle, interval::Interval},
    providers::{
        CandleSource,
        okx_rest::{
            CANDLES_PATH, MAX_PAGE, fetch_rows,
            params::{candle_bar, candle_query},
            response::candle_from_row,
            unsupported,
        },
    },
};

pub struct OkxCandleSource {
    fetcher: Arc<RateLimitedFetcher>,
    policy: RetryPolicy,
}

impl OkxCandleSource {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, policy: RetryPolicy) -> Self {
        Self { fetcher, policy }
    }

    async fn page(
        &self,
        instrument: &str,
        interval: Interval,
        end_exclusive: i64,
        limit: u32,
    ) -> Result<Vec<Candle>, FetchError> {
        let bar = candle_bar(interval).map_err(|e| unsupported(CANDLES_PATH, e))?;
        let query = candle_query(instrument, &bar, end_exclusive, limit.clamp(1, MAX_PAGE));
        let rows = fetch_rows(&self.fetcher, CANDLES_PATH, &query, &self.policy).await?;
        Ok(rows.iter().filter_map(|row| candle_from_row(row)).collect())
    }
}

#[async_trait]
impl CandleSource for OkxCandleSource {
    async fn get(
        &self,
        instrument: &str,
        interval: Interval,
        bucket_start: i64,
    ) -> Result<Option<Candle>, FetchError> {
        // Ask for a short window that ends where the bucket ends, then insist on
        // the exact start: a neighbouring bucket is never substituted.
        let end = bucket_start + interval.length_ms();
        let candles = self.page(instrument, interval, end, 2).await?;
        Ok(candles.into_iter().find(|c| c.bucket_start == bucket_start))
    }

    async fn recent(
        &self,
        instrument: &str,
        interval: Interval,
        end_exclusive: i64,
        limit: u32,
    ) -> Result<Vec<Candle>, FetchError> {
        let mut candles = self.page(instrument, interval, end_exclusive, limit).await?;
        candles.retain(|c| c.bucket_start < end_exclusive);
        candles.sort_by_key(|c| c.bucket_start);
        candles.dedup_by_key(|c| c.bucket_start);
        Ok(candles)
    }
}
