//! Durable key-value cache for non-secret client state.
//!
//! Values are JSON documents addressed by string keys such as `timers` or
//! `filters.tasks`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Durable key-value cache
pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl dyn KeyValueCache {
    /// Read and decode a typed value
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a typed value
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, &value)
    }
}

/// Cache storing one JSON file per key under a directory
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !key.starts_with('.');
        if !valid {
            return Err(Error::Storage(format!("invalid cache key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.key_path(key)?;
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.key_path(key)?;
        std::fs::create_dir_all(&self.dir)?;

        // Write-then-rename so a crash never leaves a truncated document
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(value)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory cache that also counts writes
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("cache lock poisoned".to_string()))
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_cache_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));

        assert!(cache.get("filters.tasks").unwrap().is_none());

        cache
            .set("filters.tasks", &json!({"searchQuery": "milk"}))
            .unwrap();
        assert_eq!(
            cache.get("filters.tasks").unwrap(),
            Some(json!({"searchQuery": "milk"}))
        );

        cache.remove("filters.tasks").unwrap();
        assert!(cache.get("filters.tasks").unwrap().is_none());
        cache.remove("filters.tasks").unwrap();
    }

    #[test]
    fn test_file_cache_rejects_path_like_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(dir.path());
        assert!(cache.set("../escape", &json!(1)).is_err());
        assert!(cache.get("a/b").is_err());
        assert!(cache.get("").is_err());
    }

    #[test]
    fn test_typed_helpers() {
        let cache: Box<dyn KeyValueCache> = Box::new(MemoryCache::new());
        cache.save("numbers", &vec![1, 2, 3]).unwrap();
        let loaded: Option<Vec<u32>> = cache.load("numbers").unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        let missing: Option<Vec<u32>> = cache.load("other").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_memory_cache_counts_writes() {
        let cache = MemoryCache::new();
        cache.set("a", &json!(1)).unwrap();
        cache.set("a", &json!(2)).unwrap();
        assert_eq!(cache.write_count(), 2);
        assert_eq!(cache.get("a").unwrap(), Some(json!(2)));
    }
}
