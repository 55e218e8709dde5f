//! clock.rs: UTC bucket alignment
//!
//! - One stable epoch: Unix (1970-01-01T00:00:00Z), so day-sized buckets start at
//!   UTC midnight.
//! - Bucket starts are milliseconds since the epoch and always an exact multiple
//!   of the interval length.
//!
//! Everything here is pure; "now" is always passed in.

use std::time::Duration;

use chrono::{DateTime, Utc};
use market_data_ingestor::models::interval::Interval;

const NANOS_PER_MILLI: u32 = 1_000_000;

/// Start of the bucket containing `ts_ms`.
pub fn bucket_floor(ts_ms: i64, interval: Interval) -> i64 {
    let len = interval.length_ms();
    ts_ms - ts_ms.rem_euclid(len)
}

/// Start of the latest bucket whose end is at or before `now`.
pub fn closed_bucket_start(now: DateTime<Utc>, interval: Interval) -> i64 {
    bucket_floor(now.timestamp_millis(), interval) - interval.length_ms()
}

/// Time left until the bucket currently in progress closes, i.e. until
/// [`closed_bucket_start`] moves forward by one interval.
///
/// Sub-millisecond precision of `now` is honoured; the result is never negative.
pub fn wait_until_next_close(now: DateTime<Utc>, interval: Interval) -> Duration {
    let now_ms = now.timestamp_millis();
    let next_close = bucket_floor(now_ms, interval) + interval.length_ms();
    // always in 1..=len since floor <= now_ms < floor + len
    let remaining_ms = u64::try_from(next_close - now_ms).unwrap_or(0);
    let sub_ms = now.timestamp_subsec_nanos() % NANOS_PER_MILLI;
    Duration::from_millis(remaining_ms).saturating_sub(Duration::from_nanos(sub_ms.into()))
}

/// Bucket start as a UTC instant, `None` outside chrono's range.
pub fn bucket_time(bucket_start: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(bucket_start)
}
