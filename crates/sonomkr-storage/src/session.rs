// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel session: the per-channel ingestion state machine.
//!
//! # Operation
//!
//! 1. Parse the raw payload into a [`Record`]
//! 2. Ask the [`WindowPolicy`] whether the record starts a new file
//! 3. On rotation, finalize the active file (end time = newest record + 1s)
//!    and start a new one named after the record timestamp
//! 4. Write the header if the file does not have one yet, then the row
//!
//! A session is owned by exactly one worker; nothing in here is shared.

use crate::bands::band_labels;
use crate::config::ChannelConfig;
use crate::record::{MalformedRecordError, Record};
use crate::sink::{open_prefix, FileSink, SinkError};
use crate::window::{RotationReason, WindowPolicy};
use chrono::{Duration, NaiveDateTime};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Malformed record: {0}")]
    Malformed(#[from] MalformedRecordError),

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: SinkError,
    },

    #[error("Failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: SinkError,
    },
}

impl SessionError {
    /// True when the channel cannot make progress any more.
    ///
    /// A file that cannot be opened leaves the following records nowhere to go.
    pub fn is_channel_fatal(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// The file currently written by a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFile {
    prefix: PathBuf,
    started_at: NaiveDateTime,
    newest: Option<NaiveDateTime>,
    header_written: bool,
    rows: u64,
}

impl ActiveFile {
    /// Open-ended path of the file.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Timestamp of the record that opened the file.
    pub fn started_at(&self) -> &NaiveDateTime {
        &self.started_at
    }

    /// Whether the header/schema has been written.
    pub fn header_written(&self) -> bool {
        self.header_written
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// End time embedded in the finalized name.
    pub fn end_time(&self) -> NaiveDateTime {
        self.newest.unwrap_or(self.started_at) + Duration::seconds(1)
    }
}

/// Mutable per-channel state.
///
/// The header flag lives inside [`ActiveFile`], so it can only be set while
/// a file is active and is reset together with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    active_file: Option<ActiveFile>,
    last_timestamp: Option<NaiveDateTime>,
}

impl ChannelState {
    /// Active file, if any.
    pub fn active_file(&self) -> Option<&ActiveFile> {
        self.active_file.as_ref()
    }

    /// Timestamp of the newest record written.
    pub fn last_timestamp(&self) -> Option<&NaiveDateTime> {
        self.last_timestamp.as_ref()
    }

    /// Whether the active file already has its header.
    pub fn header_written(&self) -> bool {
        self.active_file
            .as_ref()
            .map(|f| f.header_written)
            .unwrap_or(false)
    }

    pub(crate) fn begin_file(&mut self, prefix: PathBuf, started_at: NaiveDateTime) {
        self.active_file = Some(ActiveFile {
            prefix,
            started_at,
            newest: None,
            header_written: false,
            rows: 0,
        });
    }

    pub(crate) fn mark_written(&mut self, timestamp: NaiveDateTime) {
        if let Some(file) = self.active_file.as_mut() {
            file.header_written = true;
            file.rows += 1;
            file.newest = Some(file.newest.map_or(timestamp, |n| n.max(timestamp)));
        }
        self.last_timestamp = Some(self.last_timestamp.map_or(timestamp, |l| l.max(timestamp)));
    }

    fn take_active(&mut self) -> Option<ActiveFile> {
        self.active_file.take()
    }
}

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No file open yet, or the last one was finalized at shutdown.
    AwaitingFirstRecord,
    /// A file is open.
    Writing,
}

/// Per-session counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Records appended.
    pub records_written: u64,
    /// Payloads rejected by the parser.
    pub malformed_records: u64,
    /// Files opened.
    pub files_opened: u64,
    /// Files renamed to their final name.
    pub files_finalized: u64,
    /// Failed appends, header writes and renames.
    pub write_errors: u64,
    /// Records older than the newest one already written.
    pub out_of_order: u64,
}

/// Ingestion state machine for one channel.
pub struct ChannelSession {
    name: String,
    dir: PathBuf,
    base_name: String,
    policy: WindowPolicy,
    sink: Box<dyn FileSink>,
    state: ChannelState,
    stats: SessionStats,
}

impl ChannelSession {
    /// Create a session writing into `dir`.
    ///
    /// `base_name` is used verbatim; see [`crate::sink::normalize_base_name`].
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        base_name: impl Into<String>,
        policy: WindowPolicy,
        sink: Box<dyn FileSink>,
    ) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            base_name: base_name.into(),
            policy,
            sink,
            state: ChannelState::default(),
            stats: SessionStats::default(),
        }
    }

    /// Create a session from a validated channel configuration.
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.data_dir.clone(),
            config.file_base_name.clone(),
            WindowPolicy::new(config.duration),
            config.format.create_sink(),
        )
    }

    /// Channel name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        if self.state.active_file.is_some() {
            SessionPhase::Writing
        } else {
            SessionPhase::AwaitingFirstRecord
        }
    }

    /// Counters.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Ingest one raw payload.
    ///
    /// A malformed payload leaves the state untouched.
    pub fn submit(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let record = match Record::parse(payload) {
            Ok(record) => record,
            Err(err) => {
                self.stats.malformed_records += 1;
                return Err(err.into());
            }
        };
        self.submit_record(&record)
    }

    /// Ingest an already parsed record.
    pub fn submit_record(&mut self, record: &Record) -> Result<(), SessionError> {
        if let Some(reason) = self.policy.rotation_reason(&record.timestamp, &self.state) {
            self.rotate(reason, &record.timestamp);
        } else if let Some(last) = self.state.last_timestamp {
            if record.timestamp < last {
                self.stats.out_of_order += 1;
                tracing::warn!(
                    channel = %self.name,
                    timestamp = %record.timestamp,
                    last = %last,
                    "Out-of-order record written to the active file"
                );
            }
        }

        self.write(record)
    }

    /// Finalize the active file, if any. Safe to call repeatedly.
    pub fn shutdown(&mut self) -> Option<PathBuf> {
        let finalized = self.finalize_active();
        self.state.last_timestamp = None;
        finalized
    }

    fn rotate(&mut self, reason: RotationReason, start: &NaiveDateTime) {
        if let Some(file) = self.state.active_file() {
            tracing::debug!(
                channel = %self.name,
                reason = %reason,
                rows = file.rows,
                "Rotating output file"
            );
        }
        self.finalize_active();

        let prefix = open_prefix(&self.dir, &self.base_name, start);
        self.state.begin_file(prefix, *start);
    }

    fn finalize_active(&mut self) -> Option<PathBuf> {
        let file = self.state.take_active()?;
        match self.sink.finalize(&file.prefix, &file.end_time()) {
            Ok(Some(path)) => {
                self.stats.files_finalized += 1;
                tracing::info!(
                    channel = %self.name,
                    path = %path.display(),
                    rows = file.rows,
                    "Finalized output file"
                );
                Some(path)
            }
            Ok(None) => None,
            Err(err) => {
                self.stats.write_errors += 1;
                tracing::error!(
                    channel = %self.name,
                    path = %file.prefix.display(),
                    "Failed to finalize output file: {}",
                    err
                );
                None
            }
        }
    }

    fn write(&mut self, record: &Record) -> Result<(), SessionError> {
        let (prefix, header_written) = match self.state.active_file() {
            Some(file) => (file.prefix.clone(), file.header_written),
            None => return Ok(()),
        };

        if !header_written {
            let labels = band_labels(record.band_indices());
            if let Err(source) = self.sink.open(&prefix, &labels) {
                self.stats.write_errors += 1;
                self.state.take_active();
                return Err(SessionError::Open {
                    path: prefix,
                    source,
                });
            }
            self.stats.files_opened += 1;
            tracing::info!(
                channel = %self.name,
                path = %prefix.display(),
                format = %self.sink.format(),
                bands = labels.len(),
                "Opened output file"
            );
        }

        if let Err(source) = self.sink.append(&prefix, record) {
            self.stats.write_errors += 1;
            if let Some(file) = self.state.active_file.as_mut() {
                file.header_written = true;
            }
            return Err(SessionError::Append {
                path: prefix,
                source,
            });
        }

        self.state.mark_written(record.timestamp);
        self.stats.records_written += 1;
        tracing::trace!(channel = %self.name, timestamp = %record.timestamp, "Record written");
        Ok(())
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        if self.state.active_file.is_some() {
            tracing::debug!(channel = %self.name, "Session dropped with an open file");
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkFormat;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn session(dir: &TempDir, format: SinkFormat, duration: u32) -> ChannelSession {
        ChannelSession::new(
            "test",
            dir.path(),
            "ch1_",
            WindowPolicy::new(duration),
            format.create_sink(),
        )
    }

    fn payload(time: &str, bands: &str) -> Vec<u8> {
        format!("2023-01-01 {};{}", time, bands).into_bytes()
    }

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn file_names(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_first_record_opens_file() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstRecord);

        session.submit(&payload("00:00:17.000", "0:1.0;")).expect("submit");

        assert_eq!(session.phase(), SessionPhase::Writing);
        assert!(session.state().header_written());
        assert_eq!(session.state().last_timestamp(), Some(&ts(0, 0, 17)));
        assert_eq!(file_names(&dir), vec!["ch1_20230101_000017"]);
    }

    #[test]
    fn test_scenario_boundary_and_gap() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session.submit(&payload("00:00:00.000", "0:1.0;")).expect("submit");
        session.submit(&payload("00:00:01.000", "0:1.0;")).expect("submit");

        let first = dir.path().join("ch1_20230101_000000");
        let content = fs::read_to_string(&first).expect("read");
        assert_eq!(content.lines().count(), 3);

        session.submit(&payload("00:01:00.000", "0:1.0;")).expect("submit");

        assert_eq!(
            file_names(&dir),
            vec!["ch1_20230101_000000_000002.csv", "ch1_20230101_000100"]
        );
        let closed = fs::read_to_string(dir.path().join("ch1_20230101_000000_000002.csv"))
            .expect("read");
        assert_eq!(closed, content);
    }

    #[test]
    fn test_end_suffix_uses_last_written_record() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session.submit(&payload("10:00:58.000", "0:1.0;")).expect("submit");
        session.submit(&payload("10:00:59.000", "0:1.0;")).expect("submit");
        session.submit(&payload("10:00:05.000", "0:1.0;")).expect("submit");
        let path = session.shutdown().expect("finalized");

        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "ch1_20230101_100058_100100.csv"
        );
        assert_eq!(session.stats().out_of_order, 1);
    }

    #[test]
    fn test_gap_rotation_off_boundary() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session.submit(&payload("00:00:10.000", "0:1.0;")).expect("submit");
        session.submit(&payload("00:00:15.000", "0:1.0;")).expect("submit");

        assert_eq!(
            file_names(&dir),
            vec!["ch1_20230101_000010_000011.csv", "ch1_20230101_000015"]
        );
        assert_eq!(session.stats().files_opened, 2);
        assert_eq!(session.stats().files_finalized, 1);
    }

    #[test]
    fn test_hourly_boundary_without_gap() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session.submit(&payload("00:59:59.000", "0:1.0;")).expect("submit");
        session.submit(&payload("01:00:00.000", "0:1.0;")).expect("submit");
        session.submit(&payload("01:00:01.000", "0:1.0;")).expect("submit");

        assert_eq!(
            file_names(&dir),
            vec!["ch1_20230101_005959_010000.csv", "ch1_20230101_010000"]
        );
    }

    #[test]
    fn test_malformed_leaves_state_unchanged() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        let err = session.submit(b"garbage;12:30.0;").unwrap_err();
        assert!(matches!(err, SessionError::Malformed(_)));
        assert!(!err.is_channel_fatal());
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstRecord);
        assert!(file_names(&dir).is_empty());

        session.submit(&payload("00:00:00.000", "0:1.0;")).expect("submit");
        let before = session.state().clone();
        session.submit(b"2023-01-01 00:00:01;").unwrap_err();
        assert_eq!(session.state(), &before);
        assert_eq!(session.stats().malformed_records, 2);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        assert!(session.shutdown().is_none());
        session.submit(&payload("00:00:00.000", "0:1.0;")).expect("submit");

        assert!(session.shutdown().is_some());
        assert!(session.shutdown().is_none());
        assert_eq!(file_names(&dir), vec!["ch1_20230101_000000_000001.csv"]);
        assert_eq!(session.stats().files_finalized, 1);
    }

    #[test]
    fn test_record_after_shutdown_starts_new_file() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session.submit(&payload("00:00:00.000", "0:1.0;")).expect("submit");
        session.shutdown();
        session.submit(&payload("00:00:01.000", "0:1.0;")).expect("submit");
        session.shutdown();

        assert_eq!(
            file_names(&dir),
            vec![
                "ch1_20230101_000000_000001.csv",
                "ch1_20230101_000001_000002.csv"
            ]
        );
    }

    #[test]
    fn test_csv_header_and_row_layout() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session
            .submit(&payload("00:00:00.000", "12:30.0;13:31.5;"))
            .expect("submit");
        let path = session.shutdown().expect("finalized");

        let content = fs::read_to_string(path).expect("read");
        assert_eq!(content, "datetime;12.5Hz;16Hz;\n20230101_000000;30.0;31.5;\n");
    }

    #[test]
    fn test_sqlite_session() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Sqlite, 60);

        session
            .submit(&payload("00:00:00.000", "12:30.0;13:31.5;"))
            .expect("submit");
        session
            .submit(&payload("00:00:01.000", "12:29.0;13:30.5;"))
            .expect("submit");
        let path = session.shutdown().expect("finalized");
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "ch1_20230101_000000_000002.db"
        );

        let conn = Connection::open(&path).unwrap();
        let rows: Vec<(i64, f64)> = conn
            .prepare("SELECT datetime, \"16Hz\" FROM data ORDER BY rowid")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0 - rows[0].0, 1000);
        assert_eq!(rows[1].1, 30.5);
    }

    #[test]
    fn test_open_failure_is_channel_fatal() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("does-not-exist");
        let mut session = ChannelSession::new(
            "test",
            &missing,
            "",
            WindowPolicy::default(),
            SinkFormat::Csv.create_sink(),
        );

        let err = session
            .submit(&payload("00:00:00.000", "0:1.0;"))
            .unwrap_err();
        assert!(err.is_channel_fatal());
        assert!(!session.state().header_written());
        assert!(session.state().active_file().is_none());
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstRecord);
        assert_eq!(session.state().last_timestamp(), None);
        assert!(session.shutdown().is_none());
    }

    #[test]
    fn test_duplicate_boundary_record_keeps_both_rows() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session.submit(&payload("00:00:00.000", "1:1.0;")).expect("submit");
        session.submit(&payload("00:00:00.000", "1:2.0;")).expect("submit");
        let path = session.shutdown().expect("finalized");

        assert_eq!(file_names(&dir), vec!["ch1_20230101_000000_000001.csv"]);
        assert_eq!(
            fs::read_to_string(path).expect("read"),
            "datetime;1Hz;\n20230101_000000;1.0;\n20230101_000000;2.0;\n"
        );
        assert_eq!(session.stats().files_opened, 1);
    }

    #[test]
    fn test_late_record_on_boundary_stays_in_active_file() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session.submit(&payload("01:00:00.000", "1:1.0;")).expect("submit");
        session.submit(&payload("01:00:01.000", "1:2.0;")).expect("submit");
        session.submit(&payload("01:00:00.000", "1:3.0;")).expect("submit");
        session.shutdown();

        assert_eq!(file_names(&dir), vec!["ch1_20230101_010000_010002.csv"]);
        assert_eq!(session.stats().records_written, 3);
        assert_eq!(session.stats().out_of_order, 1);
    }

    #[test]
    fn test_reused_window_name_does_not_overwrite() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Csv, 60);

        session.submit(&payload("00:00:00.000", "1:1.0;")).expect("submit");
        session.shutdown();
        session.submit(&payload("00:00:00.000", "1:2.0;")).expect("submit");
        session.shutdown();

        assert_eq!(
            file_names(&dir),
            vec![
                "ch1_20230101_000000_000001-1.csv",
                "ch1_20230101_000000_000001.csv"
            ]
        );
        let first = fs::read_to_string(dir.path().join("ch1_20230101_000000_000001.csv"))
            .expect("read");
        assert!(first.ends_with("20230101_000000;1.0;\n"));
    }

    #[test]
    fn test_repeated_band_index_is_not_channel_fatal() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Sqlite, 60);

        let err = session
            .submit(&payload("00:00:00.000", "12:1.0;12:2.0;"))
            .unwrap_err();
        assert!(matches!(err, SessionError::Malformed(_)));
        assert!(!err.is_channel_fatal());
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstRecord);

        session
            .submit(&payload("00:00:01.000", "12:1.0;13:2.0;"))
            .expect("submit");
        assert_eq!(session.stats().records_written, 1);
    }

    #[test]
    fn test_append_failure_keeps_channel_alive() {
        let dir = tempdir().expect("tempdir");
        let mut session = session(&dir, SinkFormat::Sqlite, 60);

        session.submit(&payload("00:00:00.000", "1:1.0;")).expect("submit");
        let err = session
            .submit(&payload("00:00:01.000", "1:1.0;2:2.0;"))
            .unwrap_err();
        assert!(matches!(err, SessionError::Append { .. }));
        assert!(!err.is_channel_fatal());

        session.submit(&payload("00:00:01.000", "1:3.0;")).expect("submit");
        assert_eq!(session.stats().records_written, 2);
        assert_eq!(session.stats().write_errors, 1);
    }
}
