// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output file sinks.
//!
//! Supports:
//! - Delimited text (`.csv`, semicolon separated)
//! - SQLite (`.db`, one `data` table per file)
//!
//! A sink owns no handle between calls: every header, row and rename opens
//! the file, writes and closes it again, so a row is on disk as soon as
//! [`FileSink::append`] returns.
//!
//! # File naming
//!
//! ```text
//! {dir}/{base}20230101_000000             while the window is open
//! {dir}/{base}20230101_000000_000101.csv  once finalized
//! ```
//!
//! An existing finalized file is never replaced; the new one gets a `-1`,
//! `-2`, ... counter before the extension.

pub mod csv;
pub mod sqlite;

pub use csv::CsvSink;
pub use sqlite::SqliteSink;

use crate::record::Record;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp layout embedded in open file names.
pub const FILE_START_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamp layout of the end-time suffix of finalized files.
pub const FILE_END_FORMAT: &str = "%H%M%S";

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Persistence format of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    /// Semicolon separated text.
    #[default]
    Csv,
    /// SQLite database with a single `data` table.
    Sqlite,
}

impl SinkFormat {
    /// Parse a configuration value (`csv` or `sqlite`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
        }
    }

    /// Extension given to finalized files.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sqlite => "db",
        }
    }

    /// Create the sink implementing this format.
    pub fn create_sink(&self) -> Box<dyn FileSink> {
        match self {
            Self::Csv => Box::new(CsvSink::new()),
            Self::Sqlite => Box::new(SqliteSink::new()),
        }
    }
}

impl std::fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persistence backend for one channel's output files.
///
/// `prefix` is always the open-ended file path produced by [`open_prefix`].
pub trait FileSink: Send {
    /// Format written by this sink.
    fn format(&self) -> SinkFormat;

    /// Create the file and emit its header/schema, one column per label.
    fn open(&self, prefix: &Path, labels: &[String]) -> Result<(), SinkError>;

    /// Append one row.
    fn append(&self, prefix: &Path, record: &Record) -> Result<(), SinkError>;

    /// Rename the file to its closed name.
    ///
    /// Returns `None` when nothing exists at `prefix`.
    fn finalize(&self, prefix: &Path, end: &NaiveDateTime) -> Result<Option<PathBuf>, SinkError> {
        if !prefix.exists() {
            tracing::debug!(path = %prefix.display(), "Nothing to finalize");
            return Ok(None);
        }

        let target = unused_finalized_path(prefix, end, self.format().extension());
        std::fs::rename(prefix, &target)?;
        Ok(Some(target))
    }
}

/// Open-ended path for a window starting at `start`.
pub fn open_prefix(dir: &Path, base_name: &str, start: &NaiveDateTime) -> PathBuf {
    dir.join(format!("{}{}", base_name, start.format(FILE_START_FORMAT)))
}

/// Closed path for a file whose last record precedes `end`.
pub fn finalized_path(prefix: &Path, end: &NaiveDateTime, extension: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(format!("_{}.{}", end.format(FILE_END_FORMAT), extension));
    PathBuf::from(name)
}

/// Like [`finalized_path`], but never names an existing file.
///
/// A taken name gets a `-1`, `-2`, ... counter before the extension.
pub fn unused_finalized_path(prefix: &Path, end: &NaiveDateTime, extension: &str) -> PathBuf {
    let target = finalized_path(prefix, end, extension);
    if !target.exists() {
        return target;
    }

    let mut counter = 1u32;
    loop {
        let mut name = prefix.as_os_str().to_owned();
        name.push(format!(
            "_{}-{}.{}",
            end.format(FILE_END_FORMAT),
            counter,
            extension
        ));
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            tracing::warn!(
                taken = %target.display(),
                path = %candidate.display(),
                "Finalized name already taken"
            );
            return candidate;
        }
        counter += 1;
    }
}

/// Normalise a configured base name: non-empty names end with `_`.
pub fn normalize_base_name(base_name: &str) -> String {
    if base_name.is_empty() || base_name.ends_with('_') {
        base_name.to_string()
    } else {
        format!("{}_", base_name)
    }
}
