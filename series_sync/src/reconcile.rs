//! Merges one bucket's candle and open-interest reading into a single record.
//!
//! [`reconcile`] is pure: the same inputs always produce the same
//! [`ReconcileOutcome`]. A [`ReconciledRecord`] has no setters, so a `price_only`
//! record can never be upgraded after the fact; late open interest is simply dropped.

use market_data_ingestor::models::{candle::Candle, open_interest::OpenInterestReading};

/// Whether both sources contributed to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completeness {
    /// Candle and open interest for the same bucket.
    Full,
    /// Candle only; open interest is unknown (not zero).
    PriceOnly,
}

impl Completeness {
    /// `full` / `price_only`.
    pub fn as_str(self) -> &'static str {
        match self {
            Completeness::Full => "full",
            Completeness::PriceOnly => "price_only",
        }
    }
}

/// Open interest carried verbatim from the upstream reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenInterest {
    /// In contracts.
    pub contracts: f64,
    /// In the base currency.
    pub base: f64,
    /// In the quote currency (USD).
    pub quote: f64,
}

/// Immutable union of a candle and (optionally) its open interest.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRecord {
    bucket_start: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume_base: f64,
    volume_quote: f64,
    open_interest: Option<OpenInterest>,
}

impl ReconciledRecord {
    /// Bucket start, ms since the epoch.
    pub fn bucket_start(&self) -> i64 {
        self.bucket_start
    }

    /// Opening price.
    pub fn open(&self) -> f64 {
        self.open
    }

    /// Highest price.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Lowest price.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Closing price.
    pub fn close(&self) -> f64 {
        self.close
    }

    /// Volume in the base asset.
    pub fn volume_base(&self) -> f64 {
        self.volume_base
    }

    /// Volume in the quote currency; upstream value when supplied, else `volume_base × close`.
    pub fn volume_quote(&self) -> f64 {
        self.volume_quote
    }

    /// `None` means unknown, which is distinct from a reading of zero.
    pub fn open_interest(&self) -> Option<OpenInterest> {
        self.open_interest
    }

    /// Derived from whether open interest is present.
    pub fn completeness(&self) -> Completeness {
        match self.open_interest {
            Some(_) => Completeness::Full,
            None => Completeness::PriceOnly,
        }
    }
}

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// A record ready to append.
    Ready(ReconciledRecord),
    /// No candle for the bucket yet; nothing to append this cycle.
    NotYetClosed,
}

/// Combines the two source results for `bucket_start`.
///
/// A candle for any other bucket counts as absent. An open-interest reading for any
/// other bucket is ignored and the record is `price_only`.
pub fn reconcile(
    candle: Option<Candle>,
    oi: Option<OpenInterestReading>,
    bucket_start: i64,
) -> ReconcileOutcome {
    let Some(candle) = candle.filter(|c| c.bucket_start == bucket_start) else {
        return ReconcileOutcome::NotYetClosed;
    };
    let open_interest = oi
        .filter(|r| r.bucket_start == bucket_start)
        .map(|r| OpenInterest {
            contracts: r.open_interest_contracts,
            base: r.open_interest_base,
            quote: r.open_interest_quote,
        });

    ReconcileOutcome::Ready(ReconciledRecord {
        bucket_start,
        open: candle.open,
        high: candle.high,
        low: candle.low,
        close: candle.close,
        volume_base: candle.volume_base,
        volume_quote: candle.quote_volume(),
        open_interest,
    })
}
