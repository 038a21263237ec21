//! File-based last-known-fix store at ~/.loadlocation/last_fix.json.
//!
//! TTL: 30 days. Older files without `source` still load.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::types::LocationFix;

const FIX_TTL_MS: i64 = 30 * 24 * 3600 * 1000; // 30 days in ms

#[derive(Serialize, Deserialize, Clone)]
struct StoredFix {
    latitude: f64,
    longitude: f64,
    timestamp: i64,
    #[serde(default)]
    source: Option<String>,
}

/// The last fix any provider produced, persisted between runs.
pub struct FixStore {
    path: PathBuf,
    entry: Option<StoredFix>,
}

impl FixStore {
    /// Load from the default location (~/.loadlocation/last_fix.json).
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let entry = Self::read_file(&path);
        Self { path, entry }
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".loadlocation")
            .join("last_fix.json")
    }

    fn read_file(path: &Path) -> Option<StoredFix> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    /// The stored fix, unless missing, expired or out of range.
    pub fn get(&self) -> Option<LocationFix> {
        let entry = self.entry.as_ref()?;
        let now = chrono::Utc::now().timestamp_millis();
        if now - entry.timestamp > FIX_TTL_MS {
            return None;
        }
        LocationFix::new(entry.latitude, entry.longitude).ok()
    }

    pub fn source(&self) -> Option<&str> {
        self.entry.as_ref()?.source.as_deref()
    }

    /// Replace the stored fix and persist it.
    pub fn put(&mut self, fix: &LocationFix, source: &str) {
        self.entry = Some(StoredFix {
            latitude: fix.latitude(),
            longitude: fix.longitude(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            source: Some(source.to_string()),
        });
        self.persist();
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "cannot create fix store directory");
            }
        }
        match serde_json::to_string_pretty(&self.entry) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    warn!(path = %self.path.display(), error = %e, "cannot persist last fix");
                }
            }
            Err(e) => warn!(error = %e, "cannot encode last fix"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn test_store() -> (FixStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_fix.json");
        (FixStore::load_from(path), dir)
    }

    #[test]
    fn test_empty_store() {
        let (store, _dir) = test_store();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_put_get() {
        let (mut store, _dir) = test_store();
        store.put(&LocationFix::new(59.3293, 18.0686).unwrap(), "ip");

        let fix = store.get().unwrap();
        assert_relative_eq!(fix.latitude(), 59.3293);
        assert_relative_eq!(fix.longitude(), 18.0686);
        assert_eq!(store.source(), Some("ip"));
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("last_fix.json");
        {
            let mut store = FixStore::load_from(path.clone());
            store.put(&LocationFix::new(35.6762, 139.6503).unwrap(), "ip");
        }

        let store = FixStore::load_from(path);
        assert_relative_eq!(store.get().unwrap().longitude(), 139.6503);
    }

    #[test]
    fn test_expired_entry_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_fix.json");
        fs::write(&path, r#"{ "latitude": 1.0, "longitude": 2.0, "timestamp": 0 }"#).unwrap();

        let store = FixStore::load_from(path);
        assert!(store.get().is_none());
    }

    #[test]
    fn test_file_without_source_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_fix.json");
        fs::write(
            &path,
            r#"{ "latitude": 21.4225, "longitude": 39.8262, "timestamp": 9999999999999 }"#,
        )
        .unwrap();

        let store = FixStore::load_from(path);
        assert!(store.get().is_some());
        assert!(store.source().is_none());
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_fix.json");
        fs::write(&path, "garbage").unwrap();
        assert!(FixStore::load_from(path).get().is_none());
    }

    #[test]
    fn test_unwritable_directory_keeps_fix_in_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let path = blocker.join("last_fix.json");
        let mut store = FixStore::load_from(path.clone());
        store.put(&LocationFix::new(5.0, 6.0).unwrap(), "ip");

        assert_relative_eq!(store.get().unwrap().latitude(), 5.0);
        assert!(!path.exists());
    }
}
