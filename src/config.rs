//! Configuration file parser for the storage core.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! All fields use `#[serde(default)]` so any subset of keys can be
//! specified; unknown keys are ignored.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound on the config file size. A multi-megabyte "config" is a
/// mistake or an attack, not a configuration.
const MAX_CONFIG_SIZE: u64 = 64 * 1024;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config file too large: {0} bytes")]
    TooLarge(u64),
}

// ============================================================================
// Configuration
// ============================================================================

/// Storage-core configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the durable record logs.
    pub data_dir: PathBuf,

    /// Days an untagged article survives before [`crate::Vault::sweep`]
    /// may remove it. 0 disables the sweep entirely.
    pub retention_days: u32,

    /// When set, articles carrying at least one tag are exempt from the
    /// retention sweep regardless of age.
    pub keep_tagged_forever: bool,

    /// Broadcast buffer for store events. A lagging subscriber loses the
    /// oldest events once the buffer wraps.
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            retention_days: 90,
            keep_tagged_forever: true,
            event_buffer: crate::events::DEFAULT_EVENT_BUFFER,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let meta = std::fs::metadata(path)?;
        if meta.len() > MAX_CONFIG_SIZE {
            return Err(ConfigError::TooLarge(meta.len()));
        }

        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.retention_days, 90);
        assert!(config.keep_tagged_forever);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "retention_days = 7\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "retention_days = [what").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        let filler = format!("# {}\n", "x".repeat(1024));
        for _ in 0..70 {
            file.write_all(filler.as_bytes()).unwrap();
        }
        drop(file);

        assert!(matches!(Config::load(&path), Err(ConfigError::TooLarge(_))));
    }
}
