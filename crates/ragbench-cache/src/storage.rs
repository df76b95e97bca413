//! Cache storage backends

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::{fs, sync::RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::{CacheError, Result};

/// A stored record. Disk files carry the original key so the key set can be
/// recovered from the directory alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: SystemTime,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: SystemTime::now(),
        }
    }
}

/// Cache storage trait
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    /// Retrieve a value
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Remove a value; removing an absent key is not an error
    async fn remove(&self, key: &str) -> Result<bool>;

    async fn contains(&self, key: &str) -> Result<bool>;

    /// Clear all entries
    async fn clear(&self) -> Result<()>;

    async fn len(&self) -> Result<usize>;

    /// Get all keys
    async fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory cache storage
#[derive(Clone)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::with_capacity(capacity))),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut data = self.data.write().await;
        Ok(data.remove(key).is_some())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let data = self.data.read().await;
        Ok(data.contains_key(key))
    }

    async fn clear(&self) -> Result<()> {
        let mut data = self.data.write().await;
        data.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let data = self.data.read().await;
        Ok(data.len())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let data = self.data.read().await;
        Ok(data.keys().cloned().collect())
    }
}

const ENTRY_EXTENSION: &str = "cache";
const TEMP_EXTENSION: &str = "tmp";
const MAX_ENCODED_KEY_LEN: usize = 100;

/// Disk-based cache storage, one JSON file per key
#[derive(Debug, Clone)]
pub struct DiskStorage {
    base_path: PathBuf,
}

impl DiskStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// File for `key`. Short keys are hex-encoded so every distinct key gets
    /// its own file; longer ones use the hex SHA-256 of the key.
    fn key_path(&self, key: &str) -> PathBuf {
        let name = if key.len() <= MAX_ENCODED_KEY_LEN {
            hex::encode(key)
        } else {
            hex::encode(Sha256::digest(key.as_bytes()))
        };
        self.base_path.join(format!("{}.{}", name, ENTRY_EXTENSION))
    }

    async fn ensure_base_dir(&self) -> Result<()> {
        if !fs::try_exists(&self.base_path).await? {
            fs::create_dir_all(&self.base_path).await?;
        }
        Ok(())
    }

    /// Read and decode an entry file. A missing file is `None`; an
    /// unparsable one is logged and also treated as absent.
    async fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }

    /// Entry stored for exactly `key`, if any.
    async fn entry_for(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self
            .read_entry(&self.key_path(key))
            .await?
            .filter(|entry| entry.key == key))
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        if !fs::try_exists(&self.base_path).await? {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    /// Writes go to a uniquely named temp file that is then renamed over the
    /// entry, so readers see either the old or the new record.
    async fn set(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.ensure_base_dir().await?;

        let entry = CacheEntry::new(key, value.clone());
        let json_data = serde_json::to_string(&entry).map_err(|e| CacheError::Serialization {
            message: e.to_string(),
        })?;

        let target = self.key_path(key);
        let mut temp_name = target.clone().into_os_string();
        temp_name.push(format!(".{}.{}", Uuid::new_v4().simple(), TEMP_EXTENSION));
        let temp = PathBuf::from(temp_name);

        fs::write(&temp, json_data).await?;
        if let Err(err) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entry_for(key).await?.map(|entry| entry.value))
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        if self.entry_for(key).await?.is_none() {
            return Ok(false);
        }
        match fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.entry_for(key).await?.is_some())
    }

    async fn clear(&self) -> Result<()> {
        for path in self.entry_paths().await? {
            match fs::remove_file(&path).await {
                Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entry_paths().await?.len())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for path in self.entry_paths().await? {
            if let Some(entry) = self.read_entry(&path).await? {
                keys.push(entry.key);
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_memory_storage_basic_operations() {
        let storage = MemoryStorage::new();

        storage.set("query:abc", &json!([1, 2, 3])).await.unwrap();
        let retrieved = storage.get("query:abc").await.unwrap().unwrap();
        assert_eq!(retrieved, json!([1, 2, 3]));

        assert!(storage.contains("query:abc").await.unwrap());
        assert!(!storage.contains("query:def").await.unwrap());

        assert!(storage.remove("query:abc").await.unwrap());
        assert!(!storage.remove("query:abc").await.unwrap());
        assert!(!storage.contains("query:abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_storage_overwrites() {
        let storage = MemoryStorage::new();
        storage.set("count:1", &json!(3)).await.unwrap();
        storage.set("count:1", &json!(5)).await.unwrap();
        assert_eq!(storage.get("count:1").await.unwrap(), Some(json!(5)));
        assert_eq!(storage.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disk_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path().join("cache"));

        assert_eq!(storage.get("prompt:abc").await.unwrap(), None);

        storage
            .set("prompt:abc", &json!({"ids": ["p1"], "scores": [0.5]}))
            .await
            .unwrap();
        let retrieved = storage.get("prompt:abc").await.unwrap().unwrap();
        assert_eq!(retrieved["ids"], json!(["p1"]));

        assert!(storage.contains("prompt:abc").await.unwrap());
        assert!(storage.remove("prompt:abc").await.unwrap());
        assert!(!storage.contains("prompt:abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_disk_storage_recovers_original_keys() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());

        storage.set("query:aa", &json!(1)).await.unwrap();
        storage.set("reranker:bb", &json!(2)).await.unwrap();

        let mut keys = storage.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["query:aa".to_string(), "reranker:bb".to_string()]);
        assert_eq!(storage.len().await.unwrap(), 2);

        storage.clear().await.unwrap();
        assert_eq!(storage.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disk_storage_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        DiskStorage::new(temp_dir.path())
            .set("vectorizer:cc", &json!([0.1, 0.2]))
            .await
            .unwrap();

        let reopened = DiskStorage::new(temp_dir.path());
        assert_eq!(
            reopened.get("vectorizer:cc").await.unwrap(),
            Some(json!([0.1, 0.2]))
        );
    }

    #[tokio::test]
    async fn test_disk_storage_corrupt_entry_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        storage.set("count:dd", &json!(7)).await.unwrap();

        tokio::fs::write(storage.key_path("count:dd"), "{not json")
            .await
            .unwrap();

        assert_eq!(storage.get("count:dd").await.unwrap(), None);
        assert!(!storage.contains("count:dd").await.unwrap());

        storage.set("count:dd", &json!(8)).await.unwrap();
        assert_eq!(storage.get("count:dd").await.unwrap(), Some(json!(8)));
    }

    #[tokio::test]
    async fn test_disk_storage_keys_map_to_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());

        storage.set("a:b", &json!(1)).await.unwrap();
        assert_eq!(storage.get("a_b").await.unwrap(), None);
        assert!(!storage.contains("a_b").await.unwrap());
        assert!(!storage.remove("a_b").await.unwrap());

        storage.set("a_b", &json!(2)).await.unwrap();
        assert_eq!(storage.get("a:b").await.unwrap(), Some(json!(1)));
        assert_eq!(storage.get("a_b").await.unwrap(), Some(json!(2)));
        assert_eq!(storage.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_disk_storage_long_keys_are_hashed() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        let long_key = format!("generator:{}", "x".repeat(500));

        storage.set(&long_key, &json!("odpowiedź")).await.unwrap();
        assert_eq!(storage.get(&long_key).await.unwrap(), Some(json!("odpowiedź")));
        assert_eq!(storage.keys().await.unwrap(), vec![long_key]);
    }

    #[tokio::test]
    async fn test_disk_storage_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path());
        for i in 0..5 {
            storage.set("query:same", &json!(i)).await.unwrap();
        }

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(temp_dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name());
        }
        assert_eq!(names.len(), 1);
        assert_eq!(storage.get("query:same").await.unwrap(), Some(json!(4)));
    }
}
