// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SonoMKR Storage Manager
//!
//! Subscribe to sound level measurement streams over ZeroMQ and persist
//! them into time-windowed files, one output directory per channel.
//!
//! # Quick Start
//!
//! ```bash
//! # Run with ./storage.toml, writing under ./data
//! sonomkr-storage
//!
//! # Explicit configuration and data root
//! sonomkr-storage --conf /etc/sonomkr/storage.toml --dir /var/lib/sonomkr
//!
//! # Print the parsed configuration and exit
//! sonomkr-storage --display-conf
//! ```
//!
//! # Output Files
//!
//! A file is opened as `{base}{YYYYMMDD_HHMMSS}` when its window starts and
//! renamed to `{base}{YYYYMMDD_HHMMSS}_{HHMMSS}.{csv|db}` once it is closed.
//!
//! | Format | Extension | Layout |
//! |--------|-----------|--------|
//! | CSV | `.csv` | `datetime;12.5Hz;...;` header, one `;`-terminated row per record |
//! | SQLite | `.db` | table `data` (`datetime` epoch ms, one REAL column per band) |

pub mod bands;
pub mod config;
pub mod datadir;
pub mod driver;
pub mod record;
pub mod session;
pub mod sink;
pub mod transport;
pub mod window;

pub use bands::{band_label, band_labels};
pub use config::{ChannelConfig, ConfigError, StorageConfig};
pub use datadir::{ensure_writable_dir, DataDirError};
pub use driver::{ChannelReport, IngestionDriver, ShutdownHandle, WorkerExit};
pub use record::{format_value, parse_record, Band, MalformedRecordError, Record};
pub use session::{ChannelSession, ChannelState, SessionError, SessionPhase, SessionStats};
pub use sink::{FileSink, SinkError, SinkFormat};
pub use transport::{QueueSource, RecordSource, TransportError, ZmqSource};
pub use window::{RotationReason, WindowPolicy};
