// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Storage manager configuration.
//!
//! # Configuration File
//!
//! ```toml
//! [[channels]]
//! name = "leq-1"
//! transportAddress = "tcp://127.0.0.1:6661"
//! transportTopic = "LEQ"
//! dataDir = "channel1"
//! fileBaseName = "leq"
//! format = "csv"        # csv | sqlite
//! duration = 60
//! ```
//!
//! Channel sections are validated one by one, so a broken section only
//! disables its own channel.

use crate::sink::{normalize_base_name, SinkFormat};
use crate::window::DEFAULT_WINDOW_DURATION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default number of connection attempts per channel.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Channel config misses the '{0}' parameter")]
    MissingField(&'static str),

    #[error("Unknown format '{0}' (expected csv or sqlite)")]
    InvalidFormat(String),

    #[error("Window duration must be greater than zero")]
    InvalidDuration,
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Channel sections, in file order.
    #[serde(default)]
    pub channels: Vec<ChannelSection>,
}

/// One `[[channels]]` section as written in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_base_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_attempts: Option<u32>,
}

/// Validated, immutable channel configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Label used in logs.
    pub name: String,
    /// Publisher endpoint, e.g. `tcp://127.0.0.1:6661`.
    pub transport_address: String,
    /// Subscription topic.
    pub transport_topic: String,
    /// Output directory.
    pub data_dir: PathBuf,
    /// File name prefix, empty or ending with `_`.
    pub file_base_name: String,
    /// Persistence format.
    pub format: SinkFormat,
    /// Window duration.
    pub duration: u32,
    /// Connection attempts before the channel is given up.
    pub connect_attempts: u32,
}

impl ChannelConfig {
    /// Create a CSV channel with default settings.
    pub fn new(
        transport_address: impl Into<String>,
        transport_topic: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        let transport_address = transport_address.into();
        let transport_topic = transport_topic.into();
        Self {
            name: format!("{}@{}", transport_topic, transport_address),
            transport_address,
            transport_topic,
            data_dir: data_dir.into(),
            file_base_name: String::new(),
            format: SinkFormat::default(),
            duration: DEFAULT_WINDOW_DURATION,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        }
    }

    /// Set the log label.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the file name prefix.
    pub fn file_base_name(mut self, base_name: &str) -> Self {
        self.file_base_name = normalize_base_name(base_name);
        self
    }

    /// Set the persistence format.
    pub fn format(mut self, format: SinkFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the window duration.
    pub fn duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }
}

impl StorageConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render the configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every channel section against the root data directory.
    ///
    /// Results keep the section order.
    pub fn resolve_channels(&self, root: &Path) -> Vec<Result<ChannelConfig, ConfigError>> {
        self.channels
            .iter()
            .map(|section| section.resolve(root))
            .collect()
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::MissingField(field)),
    }
}

impl ChannelSection {
    /// Validate this section.
    ///
    /// A relative `dataDir` is resolved against `root`; no `dataDir` means
    /// `root` itself.
    pub fn resolve(&self, root: &Path) -> Result<ChannelConfig, ConfigError> {
        let transport_address = required(&self.transport_address, "transportAddress")?;
        let transport_topic = required(&self.transport_topic, "transportTopic")?;

        let format = match self.format.as_deref() {
            None => SinkFormat::default(),
            Some(name) => SinkFormat::from_name(name)
                .ok_or_else(|| ConfigError::InvalidFormat(name.to_string()))?,
        };

        let duration = self.duration.unwrap_or(DEFAULT_WINDOW_DURATION);
        if duration == 0 {
            return Err(ConfigError::InvalidDuration);
        }

        let data_dir = match &self.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };

        let name = self
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}@{}", transport_topic, transport_address));

        Ok(ChannelConfig {
            name,
            transport_address,
            transport_topic,
            data_dir,
            file_base_name: normalize_base_name(self.file_base_name.as_deref().unwrap_or("")),
            format,
            duration,
            connect_attempts: self
                .connect_attempts
                .unwrap_or(DEFAULT_CONNECT_ATTEMPTS)
                .max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[channels]]
name = "leq-1"
transportAddress = "tcp://127.0.0.1:6661"
transportTopic = "LEQ"
dataDir = "channel1"
fileBaseName = "leq"
format = "sqlite"
duration = 15

[[channels]]
transportAddress = "tcp://127.0.0.1:6662"
transportTopic = "LEQ"

[[channels]]
transportTopic = "LEQ"
"#;

    #[test]
    fn test_parse_and_resolve() {
        let config = StorageConfig::from_toml_str(SAMPLE).expect("parse");
        assert_eq!(config.channels.len(), 3);

        let resolved = config.resolve_channels(Path::new("/srv/data"));
        let first = resolved[0].as_ref().expect("first channel");
        assert_eq!(first.name, "leq-1");
        assert_eq!(first.data_dir, PathBuf::from("/srv/data/channel1"));
        assert_eq!(first.file_base_name, "leq_");
        assert_eq!(first.format, SinkFormat::Sqlite);
        assert_eq!(first.duration, 15);

        let second = resolved[1].as_ref().expect("second channel");
        assert_eq!(second.name, "LEQ@tcp://127.0.0.1:6662");
        assert_eq!(second.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(second.file_base_name, "");
        assert_eq!(second.format, SinkFormat::Csv);
        assert_eq!(second.duration, 60);
        assert_eq!(second.connect_attempts, DEFAULT_CONNECT_ATTEMPTS);

        assert!(matches!(
            resolved[2],
            Err(ConfigError::MissingField("transportAddress"))
        ));
    }

    #[test]
    fn test_missing_topic() {
        let section = ChannelSection {
            transport_address: Some("tcp://localhost:1".into()),
            transport_topic: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(
            section.resolve(Path::new("/tmp")),
            Err(ConfigError::MissingField("transportTopic"))
        ));
    }

    #[test]
    fn test_invalid_format_and_duration() {
        let mut section = ChannelSection {
            transport_address: Some("tcp://localhost:1".into()),
            transport_topic: Some("LEQ".into()),
            format: Some("parquet".into()),
            ..Default::default()
        };
        assert!(matches!(
            section.resolve(Path::new("/tmp")),
            Err(ConfigError::InvalidFormat(_))
        ));

        section.format = None;
        section.duration = Some(0);
        assert!(matches!(
            section.resolve(Path::new("/tmp")),
            Err(ConfigError::InvalidDuration)
        ));
    }

    #[test]
    fn test_absolute_data_dir_kept() {
        let section = ChannelSection {
            transport_address: Some("tcp://localhost:1".into()),
            transport_topic: Some("LEQ".into()),
            data_dir: Some(PathBuf::from("/var/lib/sono")),
            ..Default::default()
        };
        let config = section.resolve(Path::new("/tmp")).expect("resolve");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/sono"));
    }

    #[test]
    fn test_display_round_trip_keeps_keys() {
        let config = StorageConfig::from_toml_str(SAMPLE).expect("parse");
        let rendered = config.to_toml_string().expect("render");
        assert!(rendered.contains("transportAddress = \"tcp://127.0.0.1:6661\""));
        assert!(rendered.contains("fileBaseName = \"leq\""));
        assert!(!rendered.contains("connectAttempts"));
    }

    #[test]
    fn test_missing_file() {
        let err = StorageConfig::from_file("/nonexistent/storage.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_channel_config_builder() {
        let config = ChannelConfig::new("tcp://localhost:6661", "LEQ", "/tmp/data")
            .name("ch")
            .file_base_name("site")
            .format(SinkFormat::Sqlite)
            .duration(30);
        assert_eq!(config.name, "ch");
        assert_eq!(config.file_base_name, "site_");
        assert_eq!(config.format, SinkFormat::Sqlite);
        assert_eq!(config.duration, 30);
    }
}
