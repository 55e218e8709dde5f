#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use market_data_ingestor::fetch::{
    RateLimitedFetcher, RawResponse, RetryPolicy, Transport, TransportError,
};
use nonzero_ext::nonzero;

/// One recorded GET: url plus its query pairs.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl Call {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport that replays canned outcomes in order.
#[derive(Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: Vec<Result<RawResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".into())))
    }
}

pub fn ok_json(body: &str) -> Result<RawResponse, TransportError> {
    Ok(RawResponse {
        status: 200,
        body: body.to_string(),
    })
}

pub fn fetcher(transport: Arc<ScriptedTransport>) -> Arc<RateLimitedFetcher> {
    Arc::new(RateLimitedFetcher::new(
        transport,
        "https://okx.test",
        nonzero!(100u32),
    ))
}

pub fn policy() -> RetryPolicy {
    RetryPolicy::new(nonzero!(3u32), std::time::Duration::from_secs(1))
}
