//! File-based conversion cache.
//!
//! Each converted advisory leaves a small JSON file holding a fingerprint of
//! its source data (GHSA `updatedAt`, CSAF tracking version, VuXML dates, the
//! DSA list block). On the next run a record whose fingerprint still matches
//! is reported as unchanged and not rewritten.
//!
//! # Cache Location
//!
//! - Linux: `~/.cache/osvconvert/`
//! - macOS: `~/Library/Caches/osvconvert/`
//! - Windows: `%LOCALAPPDATA%\osvconvert\`
//!
//! # Example
//!
//! ```no_run
//! use osvconvert::{Cache, SourceFormat};
//!
//! let cache = Cache::new();
//! let key = Cache::key(SourceFormat::Ghsa, "GHSA-xxxx-yyyy-zzzz");
//!
//! cache.set(&key, &"2024-03-01T00:00:00Z".to_string()).unwrap();
//! assert!(cache.is_unchanged(&key, "2024-03-01T00:00:00Z"));
//! ```

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::normalize::SourceFormat;

/// A directory of JSON files, one per key.
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    /// Creates a cache in the platform cache directory.
    pub fn new() -> Self {
        Self::with_dir(
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("osvconvert"),
        )
    }

    /// Creates a cache rooted at `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The key for one advisory of one source format.
    pub fn key(format: SourceFormat, advisory_id: &str) -> String {
        format!("{}_{}", format.as_str(), advisory_id)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Converts a cache key to a safe filename.
    fn cache_path(&self, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe_key))
    }

    /// Returns `None` if the key is absent or its file is unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let content = fs::read_to_string(self.cache_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the file
    /// cannot be written.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let content = serde_json::to_string(value)?;
        fs::write(self.cache_path(key), content)?;
        Ok(())
    }

    /// True when the stored fingerprint for `key` equals `fingerprint`.
    pub fn is_unchanged(&self, key: &str, fingerprint: &str) -> bool {
        self.get::<String>(key)
            .is_some_and(|stored| stored == fingerprint)
    }

    /// Removes every cached entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be read.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)?.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "json") {
                    let _ = fs::remove_file(path);
                }
            }
        }
        Ok(())
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_includes_format() {
        assert_eq!(
            Cache::key(SourceFormat::RedHat, "RHSA-2024:5101"),
            "redhat_RHSA-2024:5101"
        );
    }

    #[test]
    fn test_set_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::with_dir(dir.path().join("cache"));

        assert_eq!(cache.get::<String>("ghsa_GHSA-1"), None);
        cache.set("ghsa_GHSA-1", &"2024-01-01".to_string()).unwrap();
        assert_eq!(
            cache.get::<String>("ghsa_GHSA-1"),
            Some("2024-01-01".to_string())
        );
    }

    #[test]
    fn test_unsafe_key_characters_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::with_dir(dir.path());
        cache.set("redhat_RHSA-2024:5101", &"1".to_string()).unwrap();
        assert!(dir.path().join("redhat_RHSA-2024_5101.json").exists());
    }

    #[test]
    fn test_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::with_dir(dir.path());
        let key = Cache::key(SourceFormat::Vuxml, "abc");

        assert!(!cache.is_unchanged(&key, "2024-05-01"));
        cache.set(&key, &"2024-05-01".to_string()).unwrap();
        assert!(cache.is_unchanged(&key, "2024-05-01"));
        assert!(!cache.is_unchanged(&key, "2024-05-02"));
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::with_dir(dir.path());
        cache.set("a", &"1".to_string()).unwrap();
        cache.set("b", &"2".to_string()).unwrap();

        cache.clear().unwrap();
        assert_eq!(cache.get::<String>("a"), None);
        assert_eq!(cache.get::<String>("b"), None);
    }

    #[test]
    fn test_clear_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::with_dir(dir.path().join("never-created"));
        assert!(cache.clear().is_ok());
    }
}
