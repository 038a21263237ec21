//! Flow configuration at ~/.loadlocation/config.json.
//!
//! Every field is optional in the file; missing fields take defaults.
//! A missing file means all defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::location::{FetchMode, LocationRequest};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub fetch_mode: FetchMode,
    pub request: LocationRequest,
    pub permission_request_code: i32,
    pub resolution_request_code: i32,
    /// Re-run the whole gate chain when returning from the background.
    pub restart_on_resume: bool,
    /// Give up on a pending fetch after this long. `None` waits forever.
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            fetch_mode: FetchMode::Continuous,
            request: LocationRequest::default(),
            permission_request_code: 1052,
            resolution_request_code: 1001,
            restart_on_resume: true,
            fetch_timeout_ms: None,
        }
    }
}

impl FlowConfig {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".loadlocation")
            .join("config.json")
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Whole-second override from the command line. Saturates instead of
    /// overflowing.
    pub fn set_fetch_timeout_secs(&mut self, secs: u64) {
        self.fetch_timeout_ms = Some(secs.saturating_mul(1000));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = FlowConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(cfg, FlowConfig::default());
        assert_eq!(cfg.permission_request_code, 1052);
        assert!(cfg.fetch_timeout().is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "fetch_mode": "one_shot", "fetch_timeout_ms": 1500, "request": { "interval_ms": 10000 } }"#).unwrap();

        let cfg = FlowConfig::load_from(&path).unwrap();
        assert_eq!(cfg.fetch_mode, FetchMode::OneShot);
        assert_eq!(cfg.fetch_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(cfg.request.interval_ms, 10000);
        assert_eq!(cfg.request.fastest_interval_ms, 2000);
        assert!(cfg.restart_on_resume);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(FlowConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_timeout_secs_override() {
        let mut cfg = FlowConfig::default();
        cfg.set_fetch_timeout_secs(3);
        assert_eq!(cfg.fetch_timeout(), Some(Duration::from_secs(3)));

        cfg.set_fetch_timeout_secs(u64::MAX);
        assert_eq!(cfg.fetch_timeout_ms, Some(u64::MAX));
    }
}
