//! Append-only CSV series file, one per (symbol, interval).
//!
//! The file starts with [`HEADER`] and holds one row per appended record:
//!
//! ```text
//! Open Time,Open,High,Low,Close,Quote Asset Volume,Open Interest (USD)
//! 2024-09-01 12:00:00,99,101,98,100,200,6500000
//! 2024-09-01 12:05:00,100,102,99.5,101,150.5,
//! ```
//!
//! An empty last column means open interest was unknown for that bucket. The store
//! never reads rows back before writing, so it does not enforce uniqueness; readers
//! deduplicate by `Open Time` (see [`crate::ledger`]).

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use snafu::{Backtrace, ResultExt, Snafu};
use tracing::{debug, info};

use crate::{clock::bucket_time, reconcile::ReconciledRecord};

/// Column header of every series file.
pub const HEADER: [&str; 7] = [
    "Open Time",
    "Open",
    "High",
    "Low",
    "Close",
    "Quote Asset Volume",
    "Open Interest (USD)",
];

/// `Open Time` rendering, always UTC.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The backing file could not be created, opened or inspected.
    #[snafu(display("Failed to open store {}: {source}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// A row could not be written or flushed.
    #[snafu(display("Failed to write to store {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: csv::Error,
        backtrace: Backtrace,
    },

    /// Flushing to disk failed, so the row may not survive a crash.
    #[snafu(display("Failed to sync store {}: {source}", path.display()))]
    Sync {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// The header of an existing file could not be read.
    #[snafu(display("Failed to read header of {}: {source}", path.display()))]
    ReadHeader {
        path: PathBuf,
        source: csv::Error,
        backtrace: Backtrace,
    },

    /// An existing file does not carry the expected header.
    #[snafu(display("{} has header {found:?}, expected {expected:?}", path.display()))]
    HeaderMismatch {
        path: PathBuf,
        found: Vec<String>,
        expected: Vec<String>,
    },

    /// The bucket start cannot be rendered as a date.
    #[snafu(display("Bucket start {bucket_start} is out of range"))]
    Timestamp { bucket_start: i64 },
}

/// One persisted row, as written and as read back.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    /// Bucket start, ms since the epoch.
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Quote-currency volume.
    pub quote_volume: f64,
    /// `None` when open interest was unknown.
    pub open_interest_usd: Option<f64>,
}

impl LedgerRow {
    pub fn is_price_only(&self) -> bool {
        self.open_interest_usd.is_none()
    }

    fn fields(&self) -> Result<[String; 7], StoreError> {
        let time = bucket_time(self.bucket_start).ok_or(StoreError::Timestamp {
            bucket_start: self.bucket_start,
        })?;
        Ok([
            time.format(TIME_FORMAT).to_string(),
            self.open.to_string(),
            self.high.to_string(),
            self.low.to_string(),
            self.close.to_string(),
            self.quote_volume.to_string(),
            self.open_interest_usd
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ])
    }
}

impl From<&ReconciledRecord> for LedgerRow {
    fn from(record: &ReconciledRecord) -> Self {
        Self {
            bucket_start: record.bucket_start(),
            open: record.open(),
            high: record.high(),
            low: record.low(),
            close: record.close(),
            quote_volume: record.volume_quote(),
            open_interest_usd: record.open_interest().map(|oi| oi.quote),
        }
    }
}

/// How [`AppendOnlyStore::open_or_initialize`] found the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Created or truncated; only the header is present.
    Initialized,
    /// Existing rows kept; new rows go after them.
    Resumed,
}

/// Durable, header-stamped, append-only sink for one series.
pub struct AppendOnlyStore {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl std::fmt::Debug for AppendOnlyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendOnlyStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl AppendOnlyStore {
    /// Creates or truncates `path` and writes `header`.
    ///
    /// Meant to run once at process start, never mid-run.
    pub fn initialize(path: impl AsRef<Path>, header: &[&str]) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context(OpenSnafu { path: &path })?;
        }
        let file = File::create(&path).context(OpenSnafu { path: &path })?;
        let mut store = Self {
            writer: csv::Writer::from_writer(file),
            path,
        };
        store
            .writer
            .write_record(header)
            .context(WriteSnafu { path: &store.path })?;
        store.commit()?;
        info!(path = %store.path.display(), "initialized series store");
        Ok(store)
    }

    /// Continues an existing file when `resume` is set and the file carries `header`;
    /// otherwise behaves like [`initialize`](Self::initialize).
    pub fn open_or_initialize(
        path: impl AsRef<Path>,
        header: &[&str],
        resume: bool,
    ) -> Result<(Self, OpenMode), StoreError> {
        let path = path.as_ref();
        let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if !resume || !has_content {
            return Ok((Self::initialize(path, header)?, OpenMode::Initialized));
        }

        let found = read_header(path)?;
        if found.iter().map(String::as_str).ne(header.iter().copied()) {
            return HeaderMismatchSnafu {
                path,
                found,
                expected: header.iter().map(|h| h.to_string()).collect::<Vec<_>>(),
            }
            .fail();
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(path)
            .context(OpenSnafu { path })?;
        // a crash mid-row can leave the last line unterminated
        if !ends_with_newline(&mut file).context(OpenSnafu { path })? {
            file.write_all(b"\n").context(OpenSnafu { path })?;
        }
        info!(path = %path.display(), "resuming series store");
        Ok((
            Self {
                path: path.to_path_buf(),
                writer: csv::Writer::from_writer(file),
            },
            OpenMode::Resumed,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record and syncs it to disk before returning.
    pub fn append(&mut self, record: &ReconciledRecord) -> Result<(), StoreError> {
        self.write_row(&LedgerRow::from(record))?;
        self.commit()?;
        debug!(path = %self.path.display(), bucket_start = record.bucket_start(), "appended");
        Ok(())
    }

    /// Bulk write used for backfill; one sync at the end.
    pub fn write_batch(&mut self, records: &[ReconciledRecord]) -> Result<(), StoreError> {
        for record in records {
            self.write_row(&LedgerRow::from(record))?;
        }
        self.commit()
    }

    /// Writes rows that were read back from another series file.
    pub fn write_rows(&mut self, rows: &[LedgerRow]) -> Result<(), StoreError> {
        for row in rows {
            self.write_row(row)?;
        }
        self.commit()
    }

    fn write_row(&mut self, row: &LedgerRow) -> Result<(), StoreError> {
        let fields = row.fields()?;
        self.writer
            .write_record(&fields)
            .context(WriteSnafu { path: &self.path })
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.writer.flush().context(SyncSnafu { path: &self.path })?;
        self.writer
            .get_ref()
            .sync_data()
            .context(SyncSnafu { path: &self.path })
    }
}

fn read_header(path: &Path) -> Result<Vec<String>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(ReadHeaderSnafu { path })?;
    let mut record = csv::StringRecord::new();
    reader
        .read_record(&mut record)
        .context(ReadHeaderSnafu { path })?;
    Ok(record.iter().map(str::to_string).collect())
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
