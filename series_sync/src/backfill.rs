//! Seeds a fresh series file with the most recent closed buckets.

use std::collections::HashMap;

use market_data_ingestor::{
    fetch::FetchError,
    models::{candle::Candle, interval::Interval, open_interest::OpenInterestReading},
    providers::{CandleSource, OpenInterestSource},
};
use snafu::Snafu;
use tracing::{info, warn};

use crate::{
    reconcile::{ReconcileOutcome, ReconciledRecord, reconcile},
    store::StoreError,
};

/// Most buckets fetched for a backfill; one upstream page.
pub const MAX_BACKFILL: u32 = 100;

/// Why a backfill wrote nothing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BackfillError {
    /// Candles could not be fetched.
    #[snafu(display("Backfill fetch failed: {source}"))]
    Fetch { source: FetchError },

    /// The batch could not be written.
    #[snafu(display("Backfill write failed: {source}"))]
    Write { source: StoreError },
}

/// Fetches up to `count` buckets ending with `closed_bucket` (inclusive) and
/// reconciles them, oldest first.
///
/// Candle failures propagate. Open-interest failures only cost the open interest:
/// the affected records come back `price_only`.
pub async fn fetch_window(
    candles: &dyn CandleSource,
    open_interest: &dyn OpenInterestSource,
    instrument: &str,
    interval: Interval,
    closed_bucket: i64,
    count: u32,
) -> Result<Vec<ReconciledRecord>, FetchError> {
    let count = count.min(MAX_BACKFILL);
    if count == 0 {
        return Ok(Vec::new());
    }
    let end = closed_bucket + interval.length_ms();
    let begin = end - i64::from(count) * interval.length_ms();

    let (candle_page, oi_page) = tokio::join!(
        candles.recent(instrument, interval, end, count),
        open_interest.range(instrument, interval, begin, end, count),
    );
    let candle_page = candle_page?;
    let oi_page = oi_page.unwrap_or_else(|error| {
        warn!(instrument, %interval, %error, "open interest history unavailable, backfilling price only");
        Vec::new()
    });

    let records = reconcile_window(candle_page, oi_page);
    info!(instrument, %interval, records = records.len(), "backfill window fetched");
    Ok(records)
}

/// Pairs candles with readings by `bucket_start`, sorted ascending, one per bucket.
pub fn reconcile_window(
    candles: Vec<Candle>,
    readings: Vec<OpenInterestReading>,
) -> Vec<ReconciledRecord> {
    let mut by_bucket: HashMap<i64, OpenInterestReading> = readings
        .into_iter()
        .map(|r| (r.bucket_start, r))
        .collect();

    let mut records: Vec<ReconciledRecord> = candles
        .into_iter()
        .filter_map(|candle| {
            let bucket_start = candle.bucket_start;
            let reading = by_bucket.remove(&bucket_start);
            match reconcile(Some(candle), reading, bucket_start) {
                ReconcileOutcome::Ready(record) => Some(record),
                ReconcileOutcome::NotYetClosed => None,
            }
        })
        .collect();
    records.sort_by_key(ReconciledRecord::bucket_start);
    records.dedup_by_key(|r| r.bucket_start());
    records
}
