//! File-based caching for source responses.
//!
//! Each entry is a JSON file named after its key, expiring `ttl` after it
//! was written. The default location is the platform cache directory:
//! - Linux: `~/.cache/vulngate/`
//! - macOS: `~/Library/Caches/vulngate/`
//! - Windows: `%LOCALAPPDATA%\vulngate\`
//!
//! Keys are escaped reversibly into file names, so distinct keys never
//! share an entry.
//!
//! # Example
//!
//! ```no_run
//! use vulngate::Cache;
//!
//! let cache = Cache::new(24);
//! cache.set("osv/nuget/foo@1.0.0", &vec!["GHSA-1".to_string()]).unwrap();
//!
//! let ids: Option<Vec<String>> = cache.get("osv/nuget/foo@1.0.0");
//! assert_eq!(ids, Some(vec!["GHSA-1".to_string()]));
//! ```

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
}

impl Cache {
    /// A cache in the platform cache directory.
    ///
    /// # Arguments
    ///
    /// * `ttl_hours` - How long an entry stays valid; 0 expires entries at once
    pub fn new(ttl_hours: u64) -> Self {
        Self::with_dir(default_cache_dir(), ttl_hours)
    }

    /// A cache in `dir`, which is created on the first write.
    ///
    /// # Example
    ///
    /// ```
    /// use vulngate::Cache;
    ///
    /// let dir = std::env::temp_dir().join("vulngate-doc-cache");
    /// let cache = Cache::with_dir(&dir, 1);
    /// assert_eq!(cache.get::<u32>("never-written"), None);
    /// ```
    pub fn with_dir(dir: impl Into<PathBuf>, ttl_hours: u64) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::from_secs(ttl_hours * 3600),
        }
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }

    /// Returns the cached value, or `None` if missing, expired, or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.cache_path(key);
        let modified = fs::metadata(&path).ok()?.modified().ok()?;

        let expired = SystemTime::now()
            .duration_since(modified)
            .map(|elapsed| elapsed > self.ttl)
            .unwrap_or(false);
        if expired {
            let _ = fs::remove_file(&path);
            return None;
        }

        let content = fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Stores `value` as JSON under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.cache_path(key), serde_json::to_string(value)?)?;
        Ok(())
    }

    /// Removes every cached entry.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)?.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    let _ = fs::remove_file(path);
                }
            }
        }
        Ok(())
    }
}

/// Turns a key into a file name stem.
///
/// ASCII letters, digits, `-` and `.` are kept; every other byte, `_`
/// included, becomes `_` plus two hex digits. The mapping is injective.
fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("_{:02x}", byte));
        }
    }
    escaped
}

pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vulngate")
}
