//! Synchronizer configuration: parsing, environment overrides and validation.
//!
//! A TOML file describes the HTTP client, the retry policy, the loop timing, the
//! symbol aliases and the list of (symbol, interval) pairs to keep in sync:
//!
//! ```toml
//! [http]
//! requests_per_second = 5
//!
//! [retry]
//! attempt_budget = 3
//! base_backoff_ms = 1000
//!
//! [[pairs]]
//! symbol = "BTC"
//! interval = "5m"
//! output = "data/btc_5m.csv"
//! backfill = 100
//! ```
//!
//! Every section is optional. Environment variables `SERIES_SYNC_BASE_URL`,
//! `SERIES_SYNC_ATTEMPT_BUDGET` and `SERIES_SYNC_BASE_BACKOFF_MS` override the file.
//! Anything that would make a pair unrunnable (unknown symbol, unsupported interval,
//! two pairs on one file) is reported by [`SyncConfig::resolve_pairs`] before any
//! loop starts.

use std::{
    collections::HashSet,
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use indexmap::IndexMap;
use market_data_ingestor::{
    fetch::RetryPolicy,
    models::interval::{Interval, IntervalError},
    providers::okx_rest::{DEFAULT_BASE_URL, params::{UnsupportedInterval, validate_interval}},
};
use serde::{Deserialize, Serialize};
use shared_utils::env::{InvalidEnvVarError, parse_env_var};
use thiserror::Error;

use crate::{backfill::MAX_BACKFILL, sync_loop::PairSpec};

/// Overrides `http.base_url`.
pub const ENV_BASE_URL: &str = "SERIES_SYNC_BASE_URL";
/// Overrides `retry.attempt_budget`.
pub const ENV_ATTEMPT_BUDGET: &str = "SERIES_SYNC_ATTEMPT_BUDGET";
/// Overrides `retry.base_backoff_ms`.
pub const ENV_BASE_BACKOFF_MS: &str = "SERIES_SYNC_BASE_BACKOFF_MS";

/// Built-in aliases, used when `[symbols]` does not mention a name.
const DEFAULT_SYMBOLS: [(&str, &str); 5] = [
    ("BTC", "BTC-USDT-SWAP"),
    ("ETH", "ETH-USDT-SWAP"),
    ("SOL", "SOL-USDT-SWAP"),
    ("BNB", "BNB-USDT-SWAP"),
    ("PEPE", "1000PEPE-USDT-SWAP"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Env(#[from] InvalidEnvVarError),

    #[error("unknown symbol {0:?}")]
    UnknownSymbol(String),

    #[error("bad interval: {0}")]
    Interval(#[from] IntervalError),

    #[error(transparent)]
    UnsupportedInterval(#[from] UnsupportedInterval),

    #[error("retry.attempt_budget must be at least 1")]
    ZeroAttemptBudget,

    #[error("http.requests_per_second must be at least 1")]
    ZeroRequestRate,

    #[error("http.timeout_secs must be at least 1")]
    ZeroTimeout,

    #[error("two pairs write to {0}")]
    DuplicateOutput(PathBuf),

    #[error("no pairs configured")]
    NoPairs,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyncConfig {
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub sync: LoopConfig,
    /// Alias → instrument id; consulted before the built-in aliases.
    pub symbols: IndexMap<String, String>,
    pub pairs: Vec<PairConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct HttpConfig {
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Shared by every pair; also the burst size.
    pub requests_per_second: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first.
    pub attempt_budget: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempt_budget: 3,
            base_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoopConfig {
    /// Pause after each boundary before fetching the bucket that just closed.
    pub publish_grace_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            publish_grace_ms: 1000,
        }
    }
}

/// One `[[pairs]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PairConfig {
    /// Alias (`BTC`) or instrument id (`BTC-USDT-SWAP`).
    pub symbol: String,
    /// `5m`, `1H`, `4H`, `1D`, …
    pub interval: String,
    /// Series file; one per pair.
    pub output: PathBuf,
    /// Buckets to seed a fresh file with (capped at 100).
    #[serde(default)]
    pub backfill: u32,
    /// Continue an existing file instead of truncating it.
    #[serde(default)]
    pub resume: bool,
}

/// A validated pair, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPair {
    pub spec: PairSpec,
    pub output: PathBuf,
    pub backfill: u32,
    pub resume: bool,
}

/// Parse a config from a TOML string.
pub fn load_config_str(s: &str) -> Result<SyncConfig, ConfigError> {
    Ok(toml::from_str(s)?)
}

/// Read and parse a config file.
pub fn load_config_path(path: impl AsRef<Path>) -> Result<SyncConfig, ConfigError> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&s)
}

impl SyncConfig {
    /// Applies `SERIES_SYNC_*` overrides on top of the file.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(base_url) = parse_env_var::<String>(ENV_BASE_URL)? {
            self.http.base_url = base_url;
        }
        if let Some(budget) = parse_env_var::<u32>(ENV_ATTEMPT_BUDGET)? {
            self.retry.attempt_budget = budget;
        }
        if let Some(backoff) = parse_env_var::<u64>(ENV_BASE_BACKOFF_MS)? {
            self.retry.base_backoff_ms = backoff;
        }
        Ok(())
    }

    /// Maps an alias or instrument id to the upstream instrument id.
    ///
    /// Aliases match case-insensitively; configured aliases shadow built-in ones.
    pub fn resolve_symbol(&self, symbol: &str) -> Result<String, ConfigError> {
        let wanted = symbol.trim();
        let configured = self
            .symbols
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()));
        let mut known = configured.chain(DEFAULT_SYMBOLS.iter().copied());

        let found = known.find_map(|(alias, instrument)| {
            (alias.eq_ignore_ascii_case(wanted) || instrument == wanted).then_some(instrument)
        });
        found
            .map(str::to_string)
            .ok_or_else(|| ConfigError::UnknownSymbol(symbol.to_string()))
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let budget =
            NonZeroU32::new(self.retry.attempt_budget).ok_or(ConfigError::ZeroAttemptBudget)?;
        Ok(RetryPolicy::new(
            budget,
            Duration::from_millis(self.retry.base_backoff_ms),
        ))
    }

    pub fn requests_per_second(&self) -> Result<NonZeroU32, ConfigError> {
        NonZeroU32::new(self.http.requests_per_second).ok_or(ConfigError::ZeroRequestRate)
    }

    /// Per-request timeout. Zero would time out every request.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        match self.http.timeout_secs {
            0 => Err(ConfigError::ZeroTimeout),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    pub fn publish_grace(&self) -> Duration {
        Duration::from_millis(self.sync.publish_grace_ms)
    }

    /// Validates every pair. Any error here is fatal at startup.
    pub fn resolve_pairs(&self) -> Result<Vec<ResolvedPair>, ConfigError> {
        if self.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }
        self.retry_policy()?;
        self.requests_per_second()?;
        self.timeout()?;

        let mut outputs = HashSet::new();
        self.pairs
            .iter()
            .map(|pair| -> Result<ResolvedPair, ConfigError> {
                let instrument = self.resolve_symbol(&pair.symbol)?;
                let interval: Interval = pair.interval.parse()?;
                validate_interval(interval)?;
                if !outputs.insert(pair.output.clone()) {
                    return Err(ConfigError::DuplicateOutput(pair.output.clone()));
                }
                Ok(ResolvedPair {
                    spec: PairSpec {
                        symbol: pair.symbol.trim().to_string(),
                        instrument,
                        interval,
                    },
                    output: pair.output.clone(),
                    backfill: pair.backfill.min(MAX_BACKFILL),
                    resume: pair.resume,
                })
            })
            .collect()
    }
}
