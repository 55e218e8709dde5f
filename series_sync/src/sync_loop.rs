//! The per-pair synchronization loop.
//!
//! One [`SyncLoop`] owns one series file and cycles through
//! `Idle → Fetching → Reconciling → Persisting → Sleeping`:
//!
//! - **Idle**: work out the most recently closed bucket from the [`Clock`].
//! - **Fetching**: ask both sources for that bucket concurrently.
//! - **Reconciling**: merge the answers; a missing candle ends the cycle.
//! - **Persisting**: append the record. Failures are logged and the loop carries on.
//! - **Sleeping**: wait until the next boundary (plus a short publish grace). The
//!   wait is recomputed from the clock every time, so slow fetches never cause drift.
//!
//! Cancellation is observed before each cycle, during fetches and during the sleep,
//! but never while a record is being appended.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use market_data_ingestor::{
    fetch::FetchError,
    models::interval::Interval,
    providers::{CandleSource, OpenInterestSource},
};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backfill::{self, BackfillError, FetchSnafu, WriteSnafu},
    clock::{bucket_time, closed_bucket_start, wait_until_next_close},
    reconcile::{Completeness, ReconcileOutcome, ReconciledRecord, reconcile},
    store::{AppendOnlyStore, StoreError, TIME_FORMAT},
};

/// Default pause after a boundary before asking for the bucket that just closed.
pub const DEFAULT_PUBLISH_GRACE: Duration = Duration::from_secs(1);

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What one loop synchronizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSpec {
    /// Name used in logs, e.g. `BTC`.
    pub symbol: String,
    /// Upstream instrument id, e.g. `BTC-USDT-SWAP`.
    pub instrument: String,
    /// Bucket width.
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Fetching,
    Reconciling,
    Persisting,
    Sleeping,
}

/// How a single cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A record was durably appended.
    Appended {
        /// Bucket written.
        bucket_start: i64,
        /// Whether open interest was included.
        completeness: Completeness,
    },
    /// The candle is not published yet; nothing written.
    NotYetClosed {
        /// Bucket asked for.
        bucket_start: i64,
    },
    /// This process already appended the bucket (or a later one).
    AlreadyAppended {
        /// Bucket asked for.
        bucket_start: i64,
    },
    /// The candle fetch failed; nothing written.
    FetchFailed {
        /// Bucket asked for.
        bucket_start: i64,
        /// Why.
        error: FetchError,
    },
    /// The record was reconciled but could not be persisted; it is lost.
    StoreFailed {
        /// Bucket that was lost.
        bucket_start: i64,
        /// Why.
        error: StoreError,
    },
    /// Stopped before the cycle finished.
    Cancelled,
}

/// Cycle counters returned when a loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Cycles that ran to completion.
    pub cycles: u64,
    /// Records appended.
    pub appended: u64,
    /// Of those, how many lacked open interest.
    pub price_only: u64,
    /// Cycles that found no closed candle.
    pub not_ready: u64,
    /// Cycles skipped because the bucket was already written.
    pub already_appended: u64,
    /// Cycles whose candle fetch failed.
    pub fetch_failures: u64,
    /// Cycles whose append failed.
    pub store_failures: u64,
}

impl SyncReport {
    fn record(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Appended { completeness, .. } => {
                self.appended += 1;
                if *completeness == Completeness::PriceOnly {
                    self.price_only += 1;
                }
            }
            CycleOutcome::NotYetClosed { .. } => self.not_ready += 1,
            CycleOutcome::AlreadyAppended { .. } => self.already_appended += 1,
            CycleOutcome::FetchFailed { .. } => self.fetch_failures += 1,
            CycleOutcome::StoreFailed { .. } => self.store_failures += 1,
            CycleOutcome::Cancelled => return,
        }
        self.cycles += 1;
    }
}

/// Drives one (symbol, interval) series.
pub struct SyncLoop {
    pair: PairSpec,
    candles: Arc<dyn CandleSource>,
    open_interest: Arc<dyn OpenInterestSource>,
    store: AppendOnlyStore,
    clock: Arc<dyn Clock>,
    publish_grace: Duration,
    last_appended: Option<i64>,
}

impl SyncLoop {
    pub fn new(
        pair: PairSpec,
        candles: Arc<dyn CandleSource>,
        open_interest: Arc<dyn OpenInterestSource>,
        store: AppendOnlyStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pair,
            candles,
            open_interest,
            store,
            clock,
            publish_grace: DEFAULT_PUBLISH_GRACE,
            last_appended: None,
        }
    }

    /// Extra wait after each boundary so the upstream has time to publish.
    pub fn with_publish_grace(mut self, grace: Duration) -> Self {
        self.publish_grace = grace;
        self
    }

    pub fn pair(&self) -> &PairSpec {
        &self.pair
    }

    /// Latest bucket this process has written.
    pub fn last_appended(&self) -> Option<i64> {
        self.last_appended
    }

    /// Writes the `count` most recent closed buckets in one batch.
    ///
    /// Returns how many records were written. Meant for a freshly initialized store.
    pub async fn backfill(&mut self, count: u32) -> Result<usize, BackfillError> {
        let closed = closed_bucket_start(self.clock.now(), self.pair.interval);
        let records = backfill::fetch_window(
            self.candles.as_ref(),
            self.open_interest.as_ref(),
            &self.pair.instrument,
            self.pair.interval,
            closed,
            count,
        )
        .await
        .context(FetchSnafu)?;

        self.store.write_batch(&records).context(WriteSnafu)?;
        if let Some(last) = records.last() {
            self.last_appended = Some(last.bucket_start());
        }
        info!(symbol = %self.pair.symbol, interval = %self.pair.interval, written = records.len(), "backfill written");
        Ok(records.len())
    }

    /// Runs a single Idle → Persisting pass for the bucket that is closed right now.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        let PairSpec {
            symbol,
            instrument,
            interval,
        } = &self.pair;
        let interval = *interval;

        self.trace(State::Idle);
        let bucket_start = closed_bucket_start(self.clock.now(), interval);
        if self.last_appended.is_some_and(|last| bucket_start <= last) {
            info!(%symbol, %interval, bucket_start, "bucket already appended, skipping");
            return CycleOutcome::AlreadyAppended { bucket_start };
        }

        self.trace(State::Fetching);
        let (candles, open_interest) = (&self.candles, &self.open_interest);
        let fetches = async {
            tokio::join!(
                candles.get(instrument, interval, bucket_start),
                open_interest.get(instrument, interval, bucket_start),
            )
        };
        let (candle, reading) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CycleOutcome::Cancelled,
            fetched = fetches => fetched,
        };

        let candle = match candle {
            Ok(candle) => candle,
            Err(error) => {
                warn!(%symbol, %interval, bucket_start, retries_exhausted = error.is_exhausted(), %error, "no data this cycle");
                return CycleOutcome::FetchFailed {
                    bucket_start,
                    error,
                };
            }
        };
        let reading = reading.unwrap_or_else(|error| {
            warn!(%symbol, %interval, bucket_start, %error, "open interest unavailable");
            None
        });

        self.trace(State::Reconciling);
        let record = match reconcile(candle, reading, bucket_start) {
            ReconcileOutcome::Ready(record) => record,
            ReconcileOutcome::NotYetClosed => {
                info!(%symbol, %interval, bucket_start, "waiting for bucket close");
                return CycleOutcome::NotYetClosed { bucket_start };
            }
        };

        self.trace(State::Persisting);
        if let Err(error) = self.store.append(&record) {
            warn!(%symbol, %interval, bucket_start, %error, "append failed, record dropped");
            return CycleOutcome::StoreFailed {
                bucket_start,
                error,
            };
        }
        self.last_appended = Some(bucket_start);
        info!(%symbol, %interval, completeness = record.completeness().as_str(), "{}", status_line(&record));
        CycleOutcome::Appended {
            bucket_start,
            completeness: record.completeness(),
        }
    }

    /// Cycles until `cancel` fires, then returns the counters.
    pub async fn run(mut self, cancel: CancellationToken) -> SyncReport {
        let mut report = SyncReport::default();
        info!(symbol = %self.pair.symbol, interval = %self.pair.interval, path = %self.store.path().display(), "sync loop started");

        while !cancel.is_cancelled() {
            let outcome = self.run_once(&cancel).await;
            if matches!(outcome, CycleOutcome::Cancelled) {
                break;
            }
            report.record(&outcome);

            self.trace(State::Sleeping);
            let wait = wait_until_next_close(self.clock.now(), self.pair.interval) + self.publish_grace;
            debug!(symbol = %self.pair.symbol, ?wait, "sleeping until next close");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(
            symbol = %self.pair.symbol,
            interval = %self.pair.interval,
            cycles = report.cycles,
            appended = report.appended,
            price_only = report.price_only,
            not_ready = report.not_ready,
            already_appended = report.already_appended,
            fetch_failures = report.fetch_failures,
            store_failures = report.store_failures,
            "sync loop stopped"
        );
        report
    }

    fn trace(&self, state: State) {
        debug!(symbol = %self.pair.symbol, interval = %self.pair.interval, ?state, "state");
    }
}

/// Console narration for an appended record.
pub fn status_line(record: &ReconciledRecord) -> String {
    let time = bucket_time(record.bucket_start())
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| record.bucket_start().to_string());
    let oi = record
        .open_interest()
        .map(|oi| oi.quote.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Previous Candle: Time: {time} - OPEN: {} HIGH: {} LOW: {} CLOSE: {} VOLUME (USD): {} OPEN INTEREST (USD): {oi}",
        record.open(),
        record.high(),
        record.low(),
        record.close(),
        record.volume_quote(),
    )
}
