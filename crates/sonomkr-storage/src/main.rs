// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sonomkr-storage - Persist SonoMKR measurement streams to disk.
//!
//! Usage:
//!   sonomkr-storage
//!   sonomkr-storage --conf storage.toml --dir /var/lib/sonomkr
//!   sonomkr-storage --display-conf

use anyhow::{Context, Result};
use clap::Parser;
use sonomkr_storage::{ensure_writable_dir, IngestionDriver, StorageConfig, WorkerExit};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sonomkr-storage")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SonoMKR storage manager - persist measurement streams into CSV/SQLite files")]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long = "conf", default_value = "./storage.toml")]
    conf: PathBuf,

    /// Root data directory (relative channel dataDir values resolve against it)
    #[arg(short = 'd', long = "dir", default_value = "./data")]
    dir: PathBuf,

    /// Print the parsed configuration and exit
    #[arg(long)]
    display_conf: bool,

    /// Verbose mode (debug logs)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "sonomkr_storage=debug"
    } else {
        "sonomkr_storage=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt().with_env_filter(filter).with_target(false).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = StorageConfig::from_file(&args.conf)
        .with_context(|| format!("Cannot open configuration {}", args.conf.display()))?;

    if args.display_conf {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    ensure_writable_dir(&args.dir).context("Root data directory unusable")?;

    info!(
        conf = %args.conf.display(),
        dir = %args.dir.display(),
        channels = config.channels.len(),
        "Starting SonoMKR storage manager"
    );

    let mut driver = IngestionDriver::new();
    for (index, resolved) in config.resolve_channels(&args.dir).into_iter().enumerate() {
        match resolved {
            Ok(channel) => driver.spawn_zmq_channel(channel),
            Err(err) => error!(section = index, "Channel skipped: {}", err),
        }
    }

    if driver.channel_count() == 0 {
        warn!("No usable channel configured, nothing to do");
        return Ok(());
    }

    let reports = driver
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl+C: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await;

    let failed = reports
        .iter()
        .filter(|r| !matches!(r.exit, WorkerExit::Shutdown))
        .count();
    let records: u64 = reports.iter().map(|r| r.stats.records_written).sum();
    info!(
        channels = reports.len(),
        failed,
        records_written = records,
        "Storage manager shutdown complete"
    );

    Ok(())
}
