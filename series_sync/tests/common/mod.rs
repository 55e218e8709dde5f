#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use market_data_ingestor::{
    fetch::{FetchError, RawResponse, RejectedSnafu, Transport, TransportError},
    models::{candle::Candle, interval::Interval, open_interest::OpenInterestReading},
    providers::{CandleSource, OpenInterestSource},
};
use series_sync::sync_loop::{Clock, PairSpec};
use tempfile::TempDir;
use tokio::time::Instant;

/// 2024-09-01 12:07:30Z, mid-way through the 12:05 five-minute bucket.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 12, 7, 30).unwrap()
}

pub fn utc(h: u32, m: u32) -> i64 {
    Utc.with_ymd_and_hms(2024, 9, 1, h, m, 0)
        .unwrap()
        .timestamp_millis()
}

pub fn btc_5m() -> PairSpec {
    PairSpec {
        symbol: "BTC".to_string(),
        instrument: "BTC-USDT-SWAP".to_string(),
        interval: "5m".parse().unwrap(),
    }
}

/// Wall clock that follows tokio's (pausable) clock from a fixed origin.
pub struct TokioClock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    pub fn at(origin: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            origin,
            started: Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.origin + chrono::Duration::from_std(self.started.elapsed()).unwrap()
    }
}

pub fn candle(bucket_start: i64, close: f64) -> Candle {
    Candle {
        bucket_start,
        open: 99.0,
        high: 101.0,
        low: 98.0,
        close,
        volume_base: 2.0,
        volume_quote: None,
    }
}

pub fn reading(bucket_start: i64, quote: f64) -> OpenInterestReading {
    OpenInterestReading {
        bucket_start,
        open_interest_contracts: 1234.0,
        open_interest_base: 12.34,
        open_interest_quote: quote,
    }
}

pub fn rejected() -> FetchError {
    RejectedSnafu {
        endpoint: "/fake",
        status: Some(400u16),
        message: "bad request",
    }
    .build()
}

type Respond<T> = Box<dyn Fn(i64) -> Result<Option<T>, FetchError> + Send + Sync>;

/// Source whose answer per bucket comes from a closure, with optional latency.
pub struct Fake<T> {
    respond: Respond<T>,
    latency: Duration,
    calls: Mutex<Vec<(i64, Instant)>>,
}

impl<T> Fake<T> {
    pub fn new(
        respond: impl Fn(i64) -> Result<Option<T>, FetchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requested(&self) -> Vec<i64> {
        self.calls.lock().unwrap().iter().map(|(b, _)| *b).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    async fn answer(&self, bucket_start: i64) -> Result<Option<T>, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((bucket_start, Instant::now()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(bucket_start)
    }

    /// Answers for every bucket start in `[begin, end)`, skipping gaps.
    fn window(&self, begin: i64, end: i64, interval: Interval) -> Result<Vec<T>, FetchError> {
        let mut out = Vec::new();
        let mut b = begin;
        while b < end {
            if let Some(item) = (self.respond)(b)? {
                out.push(item);
            }
            b += interval.length_ms();
        }
        Ok(out)
    }
}

pub type FakeCandles = Fake<Candle>;
pub type FakeOpenInterest = Fake<OpenInterestReading>;

/// Every bucket has a closed candle with close = 100.
pub fn candles_always() -> FakeCandles {
    Fake::new(|b| Ok(Some(candle(b, 100.0))))
}

pub fn open_interest_never() -> FakeOpenInterest {
    Fake::new(|_| Ok(None))
}

#[async_trait]
impl CandleSource for Fake<Candle> {
    async fn get(
        &self,
        _instrument: &str,
        _interval: Interval,
        bucket_start: i64,
    ) -> Result<Option<Candle>, FetchError> {
        self.answer(bucket_start).await
    }

    async fn recent(
        &self,
        _instrument: &str,
        interval: Interval,
        end_exclusive: i64,
        limit: u32,
    ) -> Result<Vec<Candle>, FetchError> {
        let begin = end_exclusive - i64::from(limit) * interval.length_ms();
        self.window(begin, end_exclusive, interval)
    }
}

#[async_trait]
impl OpenInterestSource for Fake<OpenInterestReading> {
    async fn get(
        &self,
        _instrument: &str,
        _interval: Interval,
        bucket_start: i64,
    ) -> Result<Option<OpenInterestReading>, FetchError> {
        self.answer(bucket_start).await
    }

    async fn range(
        &self,
        _instrument: &str,
        interval: Interval,
        begin: i64,
        end_exclusive: i64,
        _limit: u32,
    ) -> Result<Vec<OpenInterestReading>, FetchError> {
        self.window(begin, end_exclusive, interval)
    }
}

/// Transport whose every request times out.
#[derive(Default)]
pub struct TimeoutTransport {
    calls: AtomicUsize,
}

impl TimeoutTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for TimeoutTransport {
    async fn get(&self, _url: &str, _query: &[(&str, String)]) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Timeout("operation timed out".into()))
    }
}

/// Temp dir that lives as long as the test holds it.
pub struct TestDir {
    _dir: TempDir,
    pub path: std::path::PathBuf,
}

pub fn series_path(name: &str) -> TestDir {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(name);
    TestDir { _dir: dir, path }
}

pub fn data_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

/// Asserts two instants-derived durations agree to within a millisecond.
pub fn assert_about(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(1),
        "expected about {expected:?}, got {actual:?}"
    );
}
