use thiserror::Error;

use crate::models::interval::{Interval, IntervalUnit};

/// The interval has no code on one of the two OKX endpoints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("interval {0} is not served by both the OKX candle and open-interest endpoints")]
pub struct UnsupportedInterval(pub Interval);

/// Checks that both the candle and the open-interest endpoint accept `interval`.
///
/// Supported: 5m, 15m, 30m, 1H, 2H, 4H, 6H, 12H, 1D, 2D, 3D.
pub fn validate_interval(interval: Interval) -> Result<(), UnsupportedInterval> {
    let amount = interval.amount().get();
    let ok = match interval.unit() {
        IntervalUnit::Minute => [5, 15, 30].contains(&amount),
        IntervalUnit::Hour => [1, 2, 4, 6, 12].contains(&amount),
        IntervalUnit::Day => [1, 2, 3].contains(&amount),
    };
    if ok { Ok(()) } else { Err(UnsupportedInterval(interval)) }
}

/// `bar` code for the candles endpoint. Six hours and longer use the UTC-aligned
/// variants so buckets start at UTC midnight rather than Hong Kong midnight.
pub fn candle_bar(interval: Interval) -> Result<String, UnsupportedInterval> {
    validate_interval(interval)?;
    let amount = interval.amount().get();
    Ok(match interval.unit() {
        IntervalUnit::Minute => format!("{amount}m"),
        IntervalUnit::Hour if amount < 6 => format!("{amount}H"),
        IntervalUnit::Hour => format!("{amount}Hutc"),
        IntervalUnit::Day => format!("{amount}Dutc"),
    })
}

/// `period` code for the open-interest history endpoint. Uses the same
/// alignment as [`candle_bar`] so readings are stamped at candle bucket starts.
pub fn open_interest_period(interval: Interval) -> Result<String, UnsupportedInterval> {
    candle_bar(interval)
}

/// Query for `/api/v5/market/candles`. `after` is exclusive: rows strictly older
/// than it come back, newest first.
pub fn candle_query(instrument: &str, bar: &str, after: i64, limit: u32) -> Vec<(&'static str, String)> {
    vec![
        ("instId", instrument.to_string()),
        ("bar", bar.to_string()),
        ("after", after.to_string()),
        ("limit", limit.to_string()),
    ]
}

/// Query for `/api/v5/rubik/stat/contracts/open-interest-history`.
pub fn open_interest_query(
    instrument: &str,
    period: &str,
    begin: i64,
    end: i64,
    limit: u32,
) -> Vec<(&'static str, String)> {
    vec![
        ("instId", instrument.to_string()),
        ("period", period.to_string()),
        ("begin", begin.to_string()),
        ("end", end.to_string()),
        ("limit", limit.to_string()),
    ]
}
