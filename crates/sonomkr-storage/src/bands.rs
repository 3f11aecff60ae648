// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Third-octave band labels.
//!
//! Records carry bare band indices. The labels are only used to name CSV
//! header columns and SQLite columns; they are never written into the data
//! rows themselves.

use std::borrow::Cow;

/// Nominal centre frequency of each third-octave band, by band index.
pub const BAND_LABELS: [&str; 45] = [
    "0.8Hz", "1Hz", "1.25Hz", "1.6Hz", "2Hz", "2.5Hz", "3.15Hz", "4Hz", "5Hz", "6.3Hz", "8Hz",
    "10Hz", "12.5Hz", "16Hz", "20Hz", "25Hz", "31.5Hz", "40Hz", "50Hz", "63Hz", "80Hz", "100Hz",
    "125Hz", "160Hz", "200Hz", "250Hz", "315Hz", "400Hz", "500Hz", "630Hz", "800Hz", "1kHz",
    "1.25kHz", "1.6kHz", "2kHz", "2.5kHz", "3.15kHz", "4kHz", "5kHz", "6.3kHz", "8kHz", "10kHz",
    "12.5kHz", "16kHz", "20kHz",
];

/// Column label for a band index.
///
/// Indices past the end of [`BAND_LABELS`] are labelled with the index itself.
pub fn band_label(index: u16) -> Cow<'static, str> {
    match BAND_LABELS.get(usize::from(index)) {
        Some(label) => Cow::Borrowed(label),
        None => Cow::Owned(index.to_string()),
    }
}

/// Labels for a sequence of band indices, order preserved.
pub fn band_labels<I>(indices: I) -> Vec<String>
where
    I: IntoIterator<Item = u16>,
{
    indices
        .into_iter()
        .map(|index| band_label(index).into_owned())
        .collect()
}
