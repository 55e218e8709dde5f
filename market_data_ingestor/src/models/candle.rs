//! Canonical in-memory representation of one closed OHLCV bucket.
//!
//! This struct is the output of every [`CandleSource`](crate::providers::CandleSource)
//! implementation, whichever exchange it talks to.

/// A single OHLCV candle, identified by the start of its bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    /// Bucket start, milliseconds since the Unix epoch (UTC).
    pub bucket_start: i64,

    /// Opening price.
    pub open: f64,

    /// Highest price during the bucket.
    pub high: f64,

    /// Lowest price during the bucket.
    pub low: f64,

    /// Closing price.
    pub close: f64,

    /// Volume in the traded (base) asset.
    pub volume_base: f64,

    /// Volume in the quote currency. Not every upstream supplies this.
    pub volume_quote: Option<f64>,
}

impl Candle {
    /// Quote-currency volume. The upstream figure is authoritative when present,
    /// otherwise it is derived as `volume_base × close`.
    pub fn quote_volume(&self) -> f64 {
        self.volume_quote.unwrap_or(self.volume_base * self.close)
    }
}
