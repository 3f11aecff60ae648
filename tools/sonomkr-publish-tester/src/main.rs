// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sonomkr-publish-tester - Publish synthetic measurement records.
//!
//! Binds one PUB socket per `--bind` endpoint and publishes the same record
//! on all of them at a fixed interval, timestamped with the local wall
//! clock truncated to the second.
//!
//! Usage:
//!   sonomkr-publish-tester
//!   sonomkr-publish-tester --bind tcp://0.0.0.0:6661 --topic LEQ --count 120

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime, Timelike};
use clap::Parser;
use sonomkr_storage::{Band, Record};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

#[derive(Parser, Debug)]
#[command(name = "sonomkr-publish-tester")]
#[command(version = "0.1.0")]
#[command(about = "Publish synthetic SonoMKR records over ZeroMQ")]
struct Args {
    /// Endpoint to bind (repeatable)
    #[arg(short, long = "bind", default_values = ["tcp://0.0.0.0:6661", "tcp://0.0.0.0:6662"])]
    bind: Vec<String>,

    /// Topic frame sent before each record
    #[arg(short, long, default_value = "LEQ")]
    topic: String,

    /// First band index
    #[arg(long, default_value = "12", value_parser = clap::value_parser!(u16).range(0..=44))]
    first_band: u16,

    /// Last band index (inclusive)
    #[arg(long, default_value = "25", value_parser = clap::value_parser!(u16).range(0..=44))]
    last_band: u16,

    /// Value published for every band
    #[arg(long, default_value = "30.0")]
    value: f64,

    /// Delay between two records (ms)
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Number of records to publish (0 = until Ctrl+C)
    #[arg(short = 'n', long, default_value = "0")]
    count: u64,
}

fn now_whole_second() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

fn sample_record(args: &Args, timestamp: NaiveDateTime) -> Record {
    let bands = (args.first_band..=args.last_band)
        .map(|index| Band {
            index,
            value: args.value,
        })
        .collect();
    Record::new(timestamp, bands)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    if args.first_band > args.last_band {
        bail!(
            "--first-band ({}) is greater than --last-band ({})",
            args.first_band,
            args.last_band
        );
    }

    let mut sockets = Vec::with_capacity(args.bind.len());
    for endpoint in &args.bind {
        let mut socket = PubSocket::new();
        socket
            .bind(endpoint)
            .await
            .with_context(|| format!("Cannot bind {}", endpoint))?;
        info!(endpoint = %endpoint, "Publishing");
        sockets.push(socket);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        let payload = sample_record(&args, now_whole_second()).to_payload();
        for socket in sockets.iter_mut() {
            let mut message = ZmqMessage::from(args.topic.clone());
            message.push_back(payload.clone().into_bytes().into());
            if let Err(err) = socket.send(message).await {
                warn!("Send failed: {}", err);
            }
        }

        sent += 1;
        tracing::debug!(sent, payload = %payload, "Record published");
        if args.count != 0 && sent >= args.count {
            break;
        }
    }

    info!(sent, "Publisher stopped");
    Ok(())
}
