//! Wires a validated configuration to running loops, one tokio task per pair.

use std::{sync::Arc, time::Duration};

use market_data_ingestor::{
    fetch::{RateLimitedFetcher, ReqwestTransport},
    providers::{
        CandleSource, OpenInterestSource, ProviderInitError,
        okx_rest::{OkxCandleSource, OkxOpenInterestSource},
    },
};
use snafu::{ResultExt, Snafu};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::{ConfigError, ResolvedPair, SyncConfig},
    store::{AppendOnlyStore, HEADER, OpenMode, StoreError},
    sync_loop::{Clock, PairSpec, SyncLoop, SyncReport},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunnerError {
    /// The HTTP client could not be built.
    #[snafu(display("{source}"))]
    Client { source: ProviderInitError },

    /// The configuration does not describe a usable client.
    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    /// A series file could not be opened; nothing was started.
    #[snafu(display("{source}"))]
    Store { source: StoreError },
}

/// The two upstream feeds every pair reads from.
#[derive(Clone)]
pub struct Sources {
    pub candles: Arc<dyn CandleSource>,
    pub open_interest: Arc<dyn OpenInterestSource>,
}

/// OKX sources over one shared, rate-limited HTTP client.
pub fn okx_sources(cfg: &SyncConfig) -> Result<Sources, RunnerError> {
    let policy = cfg.retry_policy().context(ConfigSnafu)?;
    let rate = cfg.requests_per_second().context(ConfigSnafu)?;
    let timeout = cfg.timeout().context(ConfigSnafu)?;
    let transport = ReqwestTransport::new(timeout).context(ClientSnafu)?;
    let fetcher = Arc::new(RateLimitedFetcher::new(
        Arc::new(transport),
        cfg.http.base_url.clone(),
        rate,
    ));
    info!(base_url = fetcher.base_url(), requests_per_second = rate.get(), "okx sources ready");
    Ok(Sources {
        candles: Arc::new(OkxCandleSource::new(fetcher.clone(), policy)),
        open_interest: Arc::new(OkxOpenInterestSource::new(fetcher, policy)),
    })
}

/// Final counters of one pair.
#[derive(Debug, Clone)]
pub struct PairReport {
    pub pair: PairSpec,
    pub report: SyncReport,
}

/// Opens every series file, then runs all pairs until `cancel` fires.
///
/// Files are opened before any task starts, so a bad path stops everything up
/// front. A fresh file with `backfill > 0` is seeded first; a failed backfill is
/// logged and live sync starts anyway.
pub async fn run_pairs(
    pairs: Vec<ResolvedPair>,
    sources: Sources,
    clock: Arc<dyn Clock>,
    publish_grace: Duration,
    cancel: CancellationToken,
) -> Result<Vec<PairReport>, RunnerError> {
    let mut prepared = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let (store, mode) = AppendOnlyStore::open_or_initialize(&pair.output, &HEADER, pair.resume)
            .context(StoreSnafu)?;
        prepared.push((pair, store, mode));
    }

    let mut tasks = JoinSet::new();
    for (pair, store, mode) in prepared {
        let mut sync = SyncLoop::new(
            pair.spec.clone(),
            sources.candles.clone(),
            sources.open_interest.clone(),
            store,
            clock.clone(),
        )
        .with_publish_grace(publish_grace);
        let cancel = cancel.clone();

        tasks.spawn(async move {
            if mode == OpenMode::Initialized && pair.backfill > 0 {
                if let Err(error) = sync.backfill(pair.backfill).await {
                    let spec = sync.pair();
                    warn!(symbol = %spec.symbol, interval = %spec.interval, %error, "backfill failed, starting live sync anyway");
                }
            }
            let report = sync.run(cancel).await;
            PairReport {
                pair: pair.spec,
                report,
            }
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(error) => warn!(%error, "sync task ended abnormally"),
        }
    }
    Ok(reports)
}
