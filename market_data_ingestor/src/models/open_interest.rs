//! Open-interest snapshot for one bucket.

/// Outstanding derivatives exposure reported for the bucket starting at `bucket_start`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenInterestReading {
    /// Bucket start, milliseconds since the Unix epoch (UTC).
    pub bucket_start: i64,
    /// Open interest in contracts.
    pub open_interest_contracts: f64,
    /// Open interest in the base currency (coins).
    pub open_interest_base: f64,
    /// Open interest in the quote currency (USD).
    pub open_interest_quote: f64,
}
