// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Semicolon separated text sink.
//!
//! ```text
//! datetime;12.5Hz;16Hz;
//! 20230101_000000;30.0;31.5;
//! ```

use super::{FileSink, SinkError, SinkFormat, FILE_START_FORMAT};
use crate::record::{format_value, Record};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// CSV sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvSink;

impl CsvSink {
    pub fn new() -> Self {
        Self
    }

    /// Header line for the given column labels.
    pub fn header_line(labels: &[String]) -> String {
        let mut line = String::from("datetime;");
        for label in labels {
            line.push_str(label);
            line.push(';');
        }
        line.push('\n');
        line
    }

    /// Data line for one record.
    pub fn row_line(record: &Record) -> String {
        let mut line = format!("{};", record.timestamp.format(FILE_START_FORMAT));
        for band in &record.bands {
            line.push_str(&format_value(band.value));
            line.push(';');
        }
        line.push('\n');
        line
    }
}

impl FileSink for CsvSink {
    fn format(&self) -> SinkFormat {
        SinkFormat::Csv
    }

    fn open(&self, prefix: &Path, labels: &[String]) -> Result<(), SinkError> {
        let mut file = OpenOptions::new().create(true).append(true).open(prefix)?;

        if file.metadata()?.len() > 0 {
            tracing::warn!(
                path = %prefix.display(),
                "Output file already exists, appending without a new header"
            );
            return Ok(());
        }

        file.write_all(Self::header_line(labels).as_bytes())?;
        Ok(())
    }

    fn append(&self, prefix: &Path, record: &Record) -> Result<(), SinkError> {
        let mut file = OpenOptions::new().append(true).open(prefix)?;
        file.write_all(Self::row_line(record).as_bytes())?;
        Ok(())
    }
}
