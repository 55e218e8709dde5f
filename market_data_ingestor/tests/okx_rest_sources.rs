mod common;

use chrono::{TimeZone, Utc};
use common::{fetcher, ok_json, policy, ScriptedTransport};
use market_data_ingestor::{
    fetch::{FetchError, TransportError},
    models::interval::Interval,
    providers::{
        CandleSource, OpenInterestSource,
        okx_rest::{CANDLES_PATH, OPEN_INTEREST_PATH, OkxCandleSource, OkxOpenInterestSource},
    },
};
use tokio::time::Instant;

fn five_min() -> Interval {
    "5m".parse().unwrap()
}

fn noon_ms() -> i64 {
    Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0)
        .unwrap()
        .timestamp_millis()
}

fn candle_row(ts: i64, close: &str, confirm: &str) -> String {
    format!(r#"["{ts}","99","101","98","{close}","20","2","200","{confirm}"]"#)
}

#[tokio::test(start_paused = true)]
async fn candle_get_matches_exact_bucket_and_sends_window_query() {
    let noon = noon_ms();
    let body = format!(
        r#"{{"code":"0","msg":"","data":[{},{}]}}"#,
        candle_row(noon, "100", "1"),
        candle_row(noon - 300_000, "97", "1"),
    );
    let transport = ScriptedTransport::new(vec![ok_json(&body)]);
    let source = OkxCandleSource::new(fetcher(transport.clone()), policy());

    let candle = source
        .get("BTC-USDT-SWAP", five_min(), noon)
        .await
        .unwrap()
        .expect("candle for noon");
    assert_eq!(candle.bucket_start, noon);
    assert_eq!(candle.close, 100.0);
    assert_eq!(candle.volume_quote, Some(200.0));

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, format!("https://okx.test{CANDLES_PATH}"));
    assert_eq!(calls[0].param("instId"), Some("BTC-USDT-SWAP"));
    assert_eq!(calls[0].param("bar"), Some("5m"));
    let after = (noon + 300_000).to_string();
    assert_eq!(calls[0].param("after"), Some(after.as_str()));
}

#[tokio::test(start_paused = true)]
async fn candle_for_another_bucket_is_not_substituted() {
    let noon = noon_ms();
    let body = format!(
        r#"{{"code":"0","data":[{}]}}"#,
        candle_row(noon - 300_000, "97", "1")
    );
    let transport = ScriptedTransport::new(vec![ok_json(&body)]);
    let source = OkxCandleSource::new(fetcher(transport), policy());
    assert_eq!(source.get("BTC-USDT-SWAP", five_min(), noon).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_candle_is_not_yet_available() {
    let noon = noon_ms();
    let body = format!(r#"{{"code":"0","data":[{}]}}"#, candle_row(noon, "100", "0"));
    let transport = ScriptedTransport::new(vec![ok_json(&body)]);
    let source = OkxCandleSource::new(fetcher(transport), policy());
    assert_eq!(source.get("BTC-USDT-SWAP", five_min(), noon).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn malformed_or_empty_bodies_mean_no_data() {
    let transport = ScriptedTransport::new(vec![
        ok_json("<html>maintenance</html>"),
        ok_json(r#"{"code":"0","data":[]}"#),
    ]);
    let source = OkxCandleSource::new(fetcher(transport), policy());
    assert_eq!(source.get("X", five_min(), noon_ms()).await.unwrap(), None);
    assert_eq!(source.get("X", five_min(), noon_ms()).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn business_error_code_is_rejected_without_retry() {
    let transport = ScriptedTransport::new(vec![
        ok_json(r#"{"code":"51001","msg":"Instrument ID does not exist","data":[]}"#),
        ok_json(r#"{"code":"0","data":[]}"#),
    ]);
    let source = OkxCandleSource::new(fetcher(transport.clone()), policy());
    let err = source.get("NOPE", five_min(), noon_ms()).await.unwrap_err();
    assert!(err.is_rejected(), "{err}");
    assert!(err.to_string().contains("51001"));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsupported_interval_is_rejected_before_any_request() {
    let transport = ScriptedTransport::new(vec![]);
    let source = OkxCandleSource::new(fetcher(transport.clone()), policy());
    let err = source
        .get("BTC-USDT-SWAP", "7m".parse().unwrap(), noon_ms())
        .await
        .unwrap_err();
    assert!(err.is_rejected());
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn candle_timeouts_exhaust_after_three_attempts_and_three_seconds() {
    let timeout = || Err(TransportError::Timeout("deadline".into()));
    let transport = ScriptedTransport::new(vec![timeout(), timeout(), timeout()]);
    let source = OkxCandleSource::new(fetcher(transport.clone()), policy());

    let started = Instant::now();
    let err = source.get("BTC-USDT-SWAP", five_min(), noon_ms()).await.unwrap_err();
    assert!(err.is_exhausted() && !err.is_rejected());
    assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
    assert_eq!(started.elapsed(), std::time::Duration::from_secs(3));
    assert_eq!(transport.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn recent_candles_come_back_oldest_first() {
    let noon = noon_ms();
    let body = format!(
        r#"{{"code":"0","data":[{},{},{}]}}"#,
        candle_row(noon, "3", "1"),
        candle_row(noon - 300_000, "2", "1"),
        candle_row(noon - 600_000, "1", "1"),
    );
    let transport = ScriptedTransport::new(vec![ok_json(&body)]);
    let source = OkxCandleSource::new(fetcher(transport.clone()), policy());
    let candles = source
        .recent("BTC-USDT-SWAP", five_min(), noon + 300_000, 3)
        .await
        .unwrap();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    assert_eq!(transport.calls()[0].param("limit"), Some("3"));
}

#[tokio::test(start_paused = true)]
async fn open_interest_get_picks_exact_bucket() {
    let noon = noon_ms();
    let body = format!(
        r#"{{"code":"0","data":[["{}","11","0.11","7000"],["{}","10","0.1","6500"]]}}"#,
        noon + 300_000,
        noon
    );
    let transport = ScriptedTransport::new(vec![ok_json(&body)]);
    let source = OkxOpenInterestSource::new(fetcher(transport.clone()), policy());

    let reading = source
        .get("BTC-USDT-SWAP", five_min(), noon)
        .await
        .unwrap()
        .expect("reading for noon");
    assert_eq!(reading.bucket_start, noon);
    assert_eq!(reading.open_interest_contracts, 10.0);
    assert_eq!(reading.open_interest_base, 0.1);
    assert_eq!(reading.open_interest_quote, 6500.0);

    let call = &transport.calls()[0];
    assert_eq!(call.url, format!("https://okx.test{OPEN_INTEREST_PATH}"));
    assert_eq!(call.param("period"), Some("5m"));
    let begin = noon.to_string();
    assert_eq!(call.param("begin"), Some(begin.as_str()));
}

#[tokio::test(start_paused = true)]
async fn open_interest_absent_for_bucket() {
    let transport = ScriptedTransport::new(vec![ok_json(r#"{"code":"0","data":[]}"#)]);
    let source = OkxOpenInterestSource::new(fetcher(transport), policy());
    assert_eq!(
        source.get("BTC-USDT-SWAP", five_min(), noon_ms()).await.unwrap(),
        None
    );
}

#[tokio::test(start_paused = true)]
async fn open_interest_range_filters_to_window() {
    let noon = noon_ms();
    let body = format!(
        r#"{{"code":"0","data":[["{}","3","0","3"],["{}","2","0","2"],["{}","1","0","1"]]}}"#,
        noon + 300_000,
        noon,
        noon - 300_000
    );
    let transport = ScriptedTransport::new(vec![ok_json(&body)]);
    let source = OkxOpenInterestSource::new(fetcher(transport), policy());
    let readings = source
        .range("BTC-USDT-SWAP", five_min(), noon - 300_000, noon + 300_000, 10)
        .await
        .unwrap();
    let starts: Vec<i64> = readings.iter().map(|r| r.bucket_start).collect();
    assert_eq!(starts, vec![noon - 300_000, noon]);
}
