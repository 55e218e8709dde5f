use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use market_data_ingestor::models::interval::Interval;
use series_sync::{
    config::{PairConfig, SyncConfig, load_config_path},
    ledger,
    runner::{okx_sources, run_pairs},
    store::{AppendOnlyStore, HEADER},
    sync_loop::SystemClock,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Series Sync CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Keep one or more series files in sync with the exchange
    Run(RunArgs),

    /// Check a series file for duplicates, gaps and ordering
    Audit {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// Interval the file was recorded at (e.g. 5m, 1H)
        #[arg(long)]
        interval: Interval,
        /// Write the deduplicated rows (first occurrence wins) to this file
        #[arg(long, value_name = "OUT")]
        dedup_to: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML config listing the pairs to run
    #[arg(long, value_name = "FILE", conflicts_with_all = ["symbol", "interval", "output"])]
    config: Option<PathBuf>,

    /// Symbol alias (BTC, ETH, SOL, BNB, PEPE) or instrument id
    #[arg(long, required_unless_present = "config")]
    symbol: Option<String>,

    /// Bucket interval: 5m, 15m, 30m, 1H, 2H, 4H, 6H, 12H, 1D, 2D, 3D
    #[arg(long, required_unless_present = "config")]
    interval: Option<String>,

    /// Series file to write
    #[arg(long, value_name = "FILE", required_unless_present = "config")]
    output: Option<PathBuf>,

    /// Seed a fresh file with this many recent buckets (max 100)
    #[arg(long, default_value_t = 0)]
    backfill: u32,

    /// Continue an existing file instead of truncating it
    #[arg(long)]
    resume: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run(args) => run(args).await,
        Cmd::Audit {
            file,
            interval,
            dedup_to,
        } => audit(file, interval, dedup_to),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    // 1) Build config: file, or a single pair from flags
    let mut cfg = match &args.config {
        Some(path) => load_config_path(path)?,
        None => {
            let (Some(symbol), Some(interval), Some(output)) = (args.symbol, args.interval, args.output) else {
                bail!("--symbol, --interval and --output are required without --config");
            };
            SyncConfig {
                pairs: vec![PairConfig {
                    symbol,
                    interval,
                    output,
                    backfill: args.backfill,
                    resume: args.resume,
                }],
                ..SyncConfig::default()
            }
        }
    };
    cfg.apply_env_overrides()?;

    // 2) Validate everything before touching the network or any file
    let pairs = cfg.resolve_pairs()?;
    let sources = okx_sources(&cfg)?;

    // 3) Run until ctrl-c
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping");
        } else {
            warn!("could not listen for ctrl-c, stopping");
        }
        on_signal.cancel();
    });

    let reports = run_pairs(
        pairs,
        sources,
        Arc::new(SystemClock),
        cfg.publish_grace(),
        cancel,
    )
    .await?;
    for r in reports {
        info!(
            symbol = %r.pair.symbol,
            interval = %r.pair.interval,
            appended = r.report.appended,
            price_only = r.report.price_only,
            "pair finished"
        );
    }
    Ok(())
}

fn audit(file: PathBuf, interval: Interval, dedup_to: Option<PathBuf>) -> Result<()> {
    let report = ledger::audit(&file, interval)
        .with_context(|| format!("auditing {}", file.display()))?;
    println!("{}\n{report}", file.display());

    if let Some(out) = dedup_to {
        let rows = ledger::read_ledger(&file)?;
        let mut store = AppendOnlyStore::initialize(&out, &HEADER)?;
        store.write_rows(&rows)?;
        println!("wrote {} rows to {}", rows.len(), out.display());
    }
    Ok(())
}
