// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Window policy: decides when the active output file must be rotated.
//!
//! Rotation triggers, any one is enough:
//! - no active file yet
//! - the record sits exactly on a window boundary
//! - more than one second elapsed since the previous record (stream gap)

use crate::record::Record;
use crate::session::ChannelState;
use chrono::{Duration, NaiveDateTime, Timelike};

/// Default window duration.
pub const DEFAULT_WINDOW_DURATION: u32 = 60;

/// Largest spacing between consecutive records that is not a gap.
pub fn max_record_spacing() -> Duration {
    Duration::seconds(1)
}

/// Why a rotation was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// No file is open for the channel.
    NewFile,
    /// The record is the first of an aligned window.
    Boundary,
    /// The stream was interrupted.
    Gap,
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewFile => write!(f, "new file"),
            Self::Boundary => write!(f, "window boundary"),
            Self::Gap => write!(f, "gap"),
        }
    }
}

/// Window rotation policy for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    duration: u32,
}

impl WindowPolicy {
    /// Create a policy. A zero duration is treated as 1.
    pub fn new(duration: u32) -> Self {
        Self {
            duration: duration.max(1),
        }
    }

    /// Configured window duration.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// True when `timestamp` is exactly on a window boundary.
    ///
    /// The boundary is `(hour * 60 + minute) % duration == 0` with whole
    /// seconds and no sub-second part.
    pub fn is_boundary(&self, timestamp: &NaiveDateTime) -> bool {
        let minute_of_day = timestamp.hour() * 60 + timestamp.minute();
        minute_of_day % self.duration == 0 && timestamp.second() == 0 && timestamp.nanosecond() == 0
    }

    /// True when more than one second separates `last` from `timestamp`.
    ///
    /// Records older than `last` are never a gap.
    pub fn is_gap(last: &NaiveDateTime, timestamp: &NaiveDateTime) -> bool {
        timestamp.signed_duration_since(*last) > max_record_spacing()
    }

    /// First matching rotation trigger for a record timestamp, if any.
    pub fn rotation_reason(
        &self,
        timestamp: &NaiveDateTime,
        state: &ChannelState,
    ) -> Option<RotationReason> {
        if state.active_file().is_none() {
            return Some(RotationReason::NewFile);
        }
        // Duplicates and late records stay in the active file.
        if let Some(last) = state.last_timestamp() {
            if timestamp <= last {
                return None;
            }
        }
        if self.is_boundary(timestamp) {
            return Some(RotationReason::Boundary);
        }
        match state.last_timestamp() {
            Some(last) if Self::is_gap(last, timestamp) => Some(RotationReason::Gap),
            _ => None,
        }
    }

    /// Whether `record` must go into a new file.
    pub fn should_rotate(&self, record: &Record, state: &ChannelState) -> bool {
        self.rotation_reason(&record.timestamp, state).is_some()
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_DURATION)
    }
}
