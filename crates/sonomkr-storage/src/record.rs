// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Measurement records and their text wire format.
//!
//! A record payload looks like:
//!
//! ```text
//! 2023-01-01 00:00:00.000;12:30.0;13:31.5;14:29.8;
//! ```
//!
//! The timestamp must be immediately followed by `;`. Every `band:value;`
//! pair after it becomes one [`Band`], in encounter order. Anything else in
//! the payload is ignored.

use chrono::{Local, NaiveDateTime, TimeZone};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;
use thiserror::Error;

/// Timestamp layout used on the wire.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Errors raised while parsing a record payload.
#[derive(Debug, Error, PartialEq)]
pub enum MalformedRecordError {
    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    #[error("No 'YYYY-MM-DD HH:MM:SS.mmm;' timestamp in payload")]
    MissingTimestamp,

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Invalid band pair '{0}'")]
    InvalidBand(String),

    #[error("Band {0} appears more than once")]
    DuplicateBand(u16),
}

/// One band slot of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// Third-octave band index.
    pub index: u16,
    /// Measured value.
    pub value: f64,
}

/// One timestamped measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Measurement time, millisecond precision, no time zone.
    pub timestamp: NaiveDateTime,
    /// Band values in payload order.
    pub bands: Vec<Band>,
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3});")
            .expect("timestamp pattern is valid")
    })
}

fn band_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+):(-?\d+(?:\.\d+)?);").expect("band pattern is valid")
    })
}

impl Record {
    /// Create a record from its parts.
    pub fn new(timestamp: NaiveDateTime, bands: Vec<Band>) -> Self {
        Self { timestamp, bands }
    }

    /// Parse a raw payload.
    pub fn parse(payload: &[u8]) -> Result<Self, MalformedRecordError> {
        let text = std::str::from_utf8(payload).map_err(|_| MalformedRecordError::NotUtf8)?;

        let caps = timestamp_regex()
            .captures(text)
            .ok_or(MalformedRecordError::MissingTimestamp)?;
        let (Some(whole), Some(stamp)) = (caps.get(0), caps.get(1)) else {
            return Err(MalformedRecordError::MissingTimestamp);
        };

        let timestamp = NaiveDateTime::parse_from_str(stamp.as_str(), TIMESTAMP_FORMAT)
            .map_err(|_| MalformedRecordError::InvalidTimestamp(stamp.as_str().to_string()))?;

        let mut bands = Vec::new();
        for pair in band_regex().captures_iter(&text[whole.end()..]) {
            let invalid = || MalformedRecordError::InvalidBand(pair[0].to_string());
            let index = pair[1].parse::<u16>().map_err(|_| invalid())?;
            let value = pair[2].parse::<f64>().map_err(|_| invalid())?;
            if bands.iter().any(|b: &Band| b.index == index) {
                return Err(MalformedRecordError::DuplicateBand(index));
            }
            bands.push(Band { index, value });
        }

        Ok(Self { timestamp, bands })
    }

    /// Band indices in payload order.
    pub fn band_indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.bands.iter().map(|b| b.index)
    }

    /// Milliseconds since the Unix epoch, reading the timestamp as local time.
    pub fn epoch_millis(&self) -> i64 {
        epoch_millis(&self.timestamp)
    }

    /// Render the record in its wire format.
    pub fn to_payload(&self) -> String {
        let mut out = format!("{};", self.timestamp.format(TIMESTAMP_FORMAT));
        for band in &self.bands {
            let _ = write!(out, "{}:{};", band.index, format_value(band.value));
        }
        out
    }
}

/// Parse a raw payload into a [`Record`].
pub fn parse_record(payload: &[u8]) -> Result<Record, MalformedRecordError> {
    Record::parse(payload)
}

/// Decimal text of a band value, as written to payloads and CSV rows.
///
/// Always positional with at least one fractional digit (`30.0`,
/// `100000000000000000000.0`), so the band grammar can read it back.
pub fn format_value(value: f64) -> String {
    let mut text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Epoch milliseconds for a naive local timestamp.
///
/// Local times skipped by a DST transition are read as UTC.
pub fn epoch_millis(timestamp: &NaiveDateTime) -> i64 {
    match Local.from_local_datetime(timestamp).earliest() {
        Some(local) => local.timestamp_millis(),
        None => timestamp.and_utc().timestamp_millis(),
    }
}
