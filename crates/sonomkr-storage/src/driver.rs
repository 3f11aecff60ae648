// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion driver.
//!
//! One worker task per channel, each owning its [`ChannelSession`] and its
//! [`RecordSource`]. Workers share nothing but the shutdown flag.
//!
//! # Operation
//!
//! 1. Wait for the next payload or for shutdown, whichever comes first
//! 2. Submit the payload to the session (parse, rotate, write)
//! 3. Repeat; on shutdown or a fatal error, finalize the open file once
//!
//! The shutdown flag is only observed while waiting for a payload, so a
//! record that has been received is always written completely.

use crate::config::ChannelConfig;
use crate::datadir::ensure_writable_dir;
use crate::session::{ChannelSession, SessionError, SessionStats};
use crate::transport::{RecordSource, TransportError, ZmqSource};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Delay between two connection attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Why a channel worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested.
    Shutdown,
    /// The source has no more messages.
    SourceClosed,
    /// Receiving failed.
    TransportFailed(String),
    /// The session could not open an output file.
    ChannelFatal(String),
    /// The channel never started (data directory or connection failure).
    SetupFailed(String),
}

/// Final state of one channel worker.
#[derive(Debug, Clone)]
pub struct ChannelReport {
    /// Channel name.
    pub name: String,
    /// Why the worker stopped.
    pub exit: WorkerExit,
    /// Session counters.
    pub stats: SessionStats,
    /// File finalized at shutdown, if one was open.
    pub finalized: Option<PathBuf>,
}

impl ChannelReport {
    fn setup_failed(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            exit: WorkerExit::SetupFailed(reason),
            stats: SessionStats::default(),
            finalized: None,
        }
    }
}

/// Handle to request a shutdown of every worker.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask every worker to stop after its current record.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    /// True once a shutdown has been requested.
    pub fn is_stopping(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Fans transport messages out to independent channel workers.
pub struct IngestionDriver {
    workers: JoinSet<ChannelReport>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl IngestionDriver {
    /// Create a driver with no channels.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            workers: JoinSet::new(),
            shutdown_tx: Arc::new(tx),
            shutdown_rx: rx,
        }
    }

    /// Handle to stop the workers.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Number of running or pending workers.
    pub fn channel_count(&self) -> usize {
        self.workers.len()
    }

    /// Spawn a worker for an already connected source.
    pub fn spawn_channel<S: RecordSource>(&mut self, session: ChannelSession, source: S) {
        let shutdown = self.shutdown_rx.clone();
        self.workers
            .spawn(async move { run_channel(session, source, shutdown).await });
    }

    /// Spawn a worker that prepares its directory, connects over ZeroMQ and
    /// then ingests until shutdown.
    pub fn spawn_zmq_channel(&mut self, config: ChannelConfig) {
        let mut shutdown = self.shutdown_rx.clone();
        self.workers.spawn(async move {
            if let Err(err) = ensure_writable_dir(&config.data_dir) {
                tracing::error!(channel = %config.name, "Channel disabled: {}", err);
                return ChannelReport::setup_failed(&config.name, err.to_string());
            }

            let connect = ZmqSource::connect_with_retry(
                &config.transport_address,
                &config.transport_topic,
                config.connect_attempts,
                CONNECT_RETRY_DELAY,
            );
            let connected = tokio::select! {
                _ = shutdown.changed() => None,
                result = connect => Some(result),
            };

            match connected {
                None => ChannelReport::setup_failed(&config.name, "shutdown before connect".into()),
                Some(Err(err)) => {
                    tracing::error!(
                        channel = %config.name,
                        address = %config.transport_address,
                        "Channel disabled, cannot subscribe: {}",
                        err
                    );
                    ChannelReport::setup_failed(&config.name, err.to_string())
                }
                Some(Ok(source)) => {
                    tracing::info!(
                        channel = %config.name,
                        address = %config.transport_address,
                        topic = %config.transport_topic,
                        dir = %config.data_dir.display(),
                        format = %config.format,
                        "Channel subscribed"
                    );
                    run_channel(ChannelSession::from_config(&config), source, shutdown).await
                }
            }
        });
    }

    /// Run until every worker has stopped.
    ///
    /// When `signal` completes, shutdown is requested and the driver waits for
    /// the workers to finalize their files.
    pub async fn run<F>(mut self, signal: F) -> Vec<ChannelReport>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);
        let mut signalled = false;
        let mut reports = Vec::new();

        loop {
            tokio::select! {
                _ = &mut signal, if !signalled => {
                    tracing::info!("Shutdown requested, finalizing open files");
                    signalled = true;
                    let _ = self.shutdown_tx.send(true);
                }
                joined = self.workers.join_next() => match joined {
                    None => break,
                    Some(Ok(report)) => reports.push(report),
                    Some(Err(err)) => tracing::error!("Channel worker aborted: {}", err),
                },
            }
        }

        reports
    }
}

impl Default for IngestionDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive one channel until shutdown, source exhaustion or a fatal error.
pub async fn run_channel<S: RecordSource>(
    mut session: ChannelSession,
    mut source: S,
    mut shutdown: watch::Receiver<bool>,
) -> ChannelReport {
    tracing::debug!(channel = %session.name(), "Channel worker started");

    let exit = loop {
        if *shutdown.borrow() {
            break WorkerExit::Shutdown;
        }

        let received = tokio::select! {
            biased;
            _ = shutdown.changed() => None,
            received = source.recv() => Some(received),
        };
        let Some(received) = received else {
            break WorkerExit::Shutdown;
        };

        match received {
            Ok(payload) => match session.submit(&payload) {
                Ok(()) => {}
                Err(err) if err.is_channel_fatal() => {
                    tracing::error!(channel = %session.name(), "Channel stopped: {}", err);
                    break WorkerExit::ChannelFatal(err.to_string());
                }
                Err(SessionError::Malformed(err)) => {
                    tracing::warn!(channel = %session.name(), "Dropping record: {}", err);
                }
                Err(err) => {
                    tracing::error!(channel = %session.name(), "{}", err);
                }
            },
            Err(TransportError::Closed) => break WorkerExit::SourceClosed,
            Err(err) if err.is_fatal() => {
                tracing::error!(channel = %session.name(), "Receive failed: {}", err);
                break WorkerExit::TransportFailed(err.to_string());
            }
            Err(err) => {
                tracing::warn!(channel = %session.name(), "Dropping message: {}", err);
            }
        }
    };

    let finalized = session.shutdown();
    let stats = session.stats().clone();

    tracing::info!(
        channel = %session.name(),
        records_written = stats.records_written,
        malformed_records = stats.malformed_records,
        files_finalized = stats.files_finalized,
        write_errors = stats.write_errors,
        "Channel worker stopped"
    );

    ChannelReport {
        name: session.name().to_string(),
        exit,
        stats,
        finalized,
    }
}
