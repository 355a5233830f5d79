//! Application configuration loaded from `~/.entityx/config.toml`.
//!
//! ```toml
//! [fetch]
//! timeout_seconds = 6
//! max_download_bytes = 10485760
//!
//! [fetch.security]
//! blocked_cidrs = ["198.51.100.0/24"]
//!
//! [ledger]
//! initial_score = 100.0
//! history_capacity = 10000
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use entityx_fetch::FetchConfig;
use entityx_ledger::{
    DEFAULT_HISTORY_CAPACITY, DEFAULT_INITIAL_SCORE, DEFAULT_RECORDER_QUEUE_CAPACITY,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityxConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Maps to the `[ledger]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    /// Score of a session before any deduction. Default: 100.0.
    pub initial_score: Option<f64>,
    /// Records kept before the oldest is evicted. Default: 10 000.
    pub history_capacity: Option<usize>,
    /// Pending history writes before `record` waits. Default: 256.
    pub recorder_queue_capacity: Option<usize>,
}

impl LedgerConfig {
    #[must_use]
    pub fn initial_score(&self) -> f64 {
        self.initial_score.unwrap_or(DEFAULT_INITIAL_SCORE)
    }

    #[must_use]
    pub fn history_capacity(&self) -> usize {
        self.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY)
    }

    #[must_use]
    pub fn recorder_queue_capacity(&self) -> usize {
        self.recorder_queue_capacity
            .unwrap_or(DEFAULT_RECORDER_QUEUE_CAPACITY)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl EntityxConfig {
    /// Load the default config file, falling back to defaults.
    ///
    /// A missing file is not an error. Unreadable or invalid files are logged.
    #[must_use]
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("{e}; using defaults");
                Self::default()
            }
        }
    }

    /// Load an explicit config file. `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".entityx").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = EntityxConfig::load_from(&dir.path().join("absent.toml")).expect("no error");
        assert!(loaded.is_none());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "").expect("write");

        let config = EntityxConfig::load_from(&path).expect("parse").expect("present");
        assert_eq!(config.fetch.timeout_seconds(), 6);
        assert_eq!(config.fetch.max_download_bytes(), 10 * 1024 * 1024);
        assert!((config.ledger.initial_score() - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.ledger.history_capacity(), 10_000);
        assert_eq!(config.ledger.recorder_queue_capacity(), 256);
    }

    #[test]
    fn tables_are_parsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[fetch]
timeout_seconds = 3
max_download_bytes = 2048
user_agent = "probe/2"

[fetch.security]
blocked_cidrs = ["198.51.100.0/24"]

[ledger]
initial_score = 75.5
history_capacity = 50
"#,
        )
        .expect("write");

        let config = EntityxConfig::load_from(&path).expect("parse").expect("present");
        assert_eq!(config.fetch.timeout_seconds(), 3);
        assert_eq!(config.fetch.max_download_bytes(), 2048);
        assert_eq!(config.fetch.user_agent.as_deref(), Some("probe/2"));
        let cidrs = config
            .fetch
            .security
            .as_ref()
            .and_then(|s| s.blocked_cidrs.clone())
            .expect("cidrs");
        assert_eq!(cidrs, vec!["198.51.100.0/24".to_string()]);
        assert!((config.ledger.initial_score() - 75.5).abs() < f64::EPSILON);
        assert_eq!(config.ledger.history_capacity(), 50);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[fetch\ntimeout_seconds = ").expect("write");

        let err = EntityxConfig::load_from(&path).expect_err("invalid");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn wrong_type_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[ledger]\nhistory_capacity = \"lots\"\n").expect("write");

        assert!(matches!(
            EntityxConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
