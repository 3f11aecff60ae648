// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport abstraction.
//!
//! The ingestion driver only needs "wait for the next payload of my
//! subscription". Two sources implement it:
//!
//! - [`ZmqSource`]: a ZeroMQ SUB socket. Messages are two frames,
//!   `[topic, payload]`.
//! - [`QueueSource`]: an in-process queue, for tests and embedding.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use zeromq::{Socket, SocketRecv, SubSocket};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("ZeroMQ error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("Expected a two-part message, got {0} part(s)")]
    Framing(usize),

    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// True when the source cannot deliver anything else.
    ///
    /// A badly framed message only loses that message.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Framing(_))
    }
}

/// A subscription delivering record payloads, one at a time.
pub trait RecordSource: Send + 'static {
    /// Wait for the next payload.
    fn recv(&mut self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Extract the payload (second frame) of a multipart message.
pub fn payload_frame<T: AsRef<[u8]>>(frames: Vec<T>) -> Result<Vec<u8>, TransportError> {
    match frames.get(1) {
        Some(payload) => Ok(payload.as_ref().to_vec()),
        None => Err(TransportError::Framing(frames.len())),
    }
}

/// ZeroMQ SUB socket source.
pub struct ZmqSource {
    socket: SubSocket,
    address: String,
}

impl ZmqSource {
    /// Connect to `address` and subscribe to `topic`.
    pub async fn connect(address: &str, topic: &str) -> Result<Self, TransportError> {
        let mut socket = SubSocket::new();
        socket.connect(address).await?;
        socket.subscribe(topic).await?;

        tracing::debug!(address, topic, "Subscribed");

        Ok(Self {
            socket,
            address: address.to_string(),
        })
    }

    /// Connect, retrying up to `attempts` times `delay` apart.
    pub async fn connect_with_retry(
        address: &str,
        topic: &str,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self, TransportError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match Self::connect(address, topic).await {
                Ok(source) => return Ok(source),
                Err(err) if attempt < attempts => {
                    tracing::warn!(
                        address,
                        attempt,
                        attempts,
                        "Connection failed, retrying: {}",
                        err
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Publisher endpoint.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl RecordSource for ZmqSource {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let message = self.socket.recv().await?;
        payload_frame(message.into_vec())
    }
}

/// In-process payload queue.
pub struct QueueSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl QueueSource {
    /// Create a queue holding up to `capacity` payloads.
    ///
    /// Dropping every sender closes the source.
    pub fn new(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

impl RecordSource for QueueSource {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}
