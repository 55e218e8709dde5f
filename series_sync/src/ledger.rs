//! Reading series files back: parsing, deduplication and audit.
//!
//! A series file may contain the same `Open Time` more than once (a restarted
//! writer re-appending its last bucket, or two writers on one file). Every reader
//! here keeps the first occurrence of a bucket and drops later ones.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use market_data_ingestor::models::interval::Interval;
use snafu::{Backtrace, ResultExt, Snafu};

use crate::store::{HEADER, LedgerRow, TIME_FORMAT};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    /// The file could not be opened or its bytes could not be read.
    #[snafu(display("Failed to read ledger {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: csv::Error,
        backtrace: Backtrace,
    },

    /// The file is not a series file.
    #[snafu(display("{} has header {found:?}, not a series file", path.display()))]
    NotASeries { path: PathBuf, found: Vec<String> },
}

/// Every well-formed row of a file in file order, plus a count of the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLedger {
    /// Parsed rows, duplicates included.
    pub rows: Vec<LedgerRow>,
    /// Rows that did not parse (torn writes, hand edits).
    pub malformed: usize,
}

/// Parses every row of a series file without deduplicating.
pub fn read_raw(path: impl AsRef<Path>) -> Result<RawLedger, LedgerError> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .context(ReadSnafu { path })?;

    let headers = reader.headers().context(ReadSnafu { path })?;
    if headers.iter().ne(HEADER.iter().copied()) {
        return NotASeriesSnafu {
            path,
            found: headers.iter().map(str::to_string).collect::<Vec<_>>(),
        }
        .fail();
    }

    let mut ledger = RawLedger::default();
    for record in reader.records() {
        match record {
            Ok(record) => match parse_row(&record) {
                Some(row) => ledger.rows.push(row),
                None => ledger.malformed += 1,
            },
            Err(err) if err.is_io_error() => return Err(err).context(ReadSnafu { path }),
            Err(_) => ledger.malformed += 1,
        }
    }
    Ok(ledger)
}

fn parse_row(record: &csv::StringRecord) -> Option<LedgerRow> {
    if record.len() != HEADER.len() {
        return None;
    }
    let num = |i: usize| record.get(i)?.trim().parse::<f64>().ok();
    let time = NaiveDateTime::parse_from_str(record.get(0)?.trim(), TIME_FORMAT).ok()?;
    let open_interest_usd = match record.get(6)?.trim() {
        "" => None,
        raw => Some(raw.parse::<f64>().ok()?),
    };
    Some(LedgerRow {
        bucket_start: time.and_utc().timestamp_millis(),
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        quote_volume: num(5)?,
        open_interest_usd,
    })
}

/// Keeps the first row for each `bucket_start`, preserving file order.
pub fn dedup_first(rows: Vec<LedgerRow>) -> Vec<LedgerRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.bucket_start))
        .collect()
}

/// Reads a series file as consumers should see it: one row per bucket.
pub fn read_ledger(path: impl AsRef<Path>) -> Result<Vec<LedgerRow>, LedgerError> {
    Ok(dedup_first(read_raw(path)?.rows))
}

/// Consecutive distinct buckets further apart than one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    /// Last bucket present before the hole.
    pub after: i64,
    /// First bucket present after the hole.
    pub before: i64,
    /// Number of bucket starts missing in between.
    pub missing: i64,
}

/// Health summary of one series file.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    pub total_rows: usize,
    pub malformed_rows: usize,
    /// Bucket starts that occur more than once, with their occurrence count.
    pub duplicates: BTreeMap<i64, usize>,
    /// Whether the raw rows never go backwards in time.
    pub ascending: bool,
    pub gaps: Vec<Gap>,
    /// Rows (after dedup) with unknown open interest.
    pub price_only: usize,
    pub unique_rows: usize,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.malformed_rows == 0 && self.duplicates.is_empty() && self.ascending && self.gaps.is_empty()
    }
}

/// Audits already-parsed rows against `interval`.
pub fn audit_rows(raw: &RawLedger, interval: Interval) -> AuditReport {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for row in &raw.rows {
        *counts.entry(row.bucket_start).or_default() += 1;
    }
    let duplicates = counts
        .iter()
        .filter(|(_, n)| **n > 1)
        .map(|(ts, n)| (*ts, *n))
        .collect();

    let ascending = raw
        .rows
        .windows(2)
        .all(|w| w[0].bucket_start <= w[1].bucket_start);

    let len = interval.length_ms();
    let starts: Vec<i64> = counts.keys().copied().collect();
    let gaps = starts
        .windows(2)
        .filter(|w| w[1] - w[0] > len)
        .map(|w| Gap {
            after: w[0],
            before: w[1],
            missing: (w[1] - w[0]) / len - 1,
        })
        .collect();

    let unique = dedup_first(raw.rows.clone());
    AuditReport {
        total_rows: raw.rows.len(),
        malformed_rows: raw.malformed,
        duplicates,
        ascending,
        gaps,
        price_only: unique.iter().filter(|r| r.is_price_only()).count(),
        unique_rows: unique.len(),
    }
}

/// Reads and audits a series file.
pub fn audit(path: impl AsRef<Path>, interval: Interval) -> Result<AuditReport, LedgerError> {
    Ok(audit_rows(&read_raw(path)?, interval))
}

fn fmt_ts(ts: i64) -> String {
    crate::clock::bucket_time(ts)
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| ts.to_string())
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rows: {} ({} unique, {} malformed)", self.total_rows, self.unique_rows, self.malformed_rows)?;
        writeln!(f, "ascending: {}", if self.ascending { "yes" } else { "no" })?;
        writeln!(f, "price only: {}", self.price_only)?;
        writeln!(f, "duplicate timestamps: {}", self.duplicates.len())?;
        for (ts, n) in &self.duplicates {
            writeln!(f, "  {} x{n}", fmt_ts(*ts))?;
        }
        write!(f, "gaps: {}", self.gaps.len())?;
        for gap in &self.gaps {
            write!(
                f,
                "\n  {} -> {} ({} missing)",
                fmt_ts(gap.after),
                fmt_ts(gap.before),
                gap.missing
            )?;
        }
        Ok(())
    }
}
