//! Cache façade with optional secondary level

use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{CacheError, Result},
    key::Namespace,
    metrics::{CacheMetrics, CacheStats, OperationTimer},
    storage::CacheStorage,
};

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,
    /// Copy secondary-level hits into the primary level
    pub promote_on_hit: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            promote_on_hit: true,
        }
    }
}

/// Typed key/value cache over one or two storage levels.
///
/// Values are stored as JSON. Writes go to every level; reads consult the
/// primary level first, then the secondary one.
pub struct Cache {
    primary_storage: Arc<dyn CacheStorage>,
    secondary_storage: Option<Arc<dyn CacheStorage>>,
    config: CacheConfig,
    metrics: Arc<CacheMetrics>,
}

impl Cache {
    pub fn new(primary_storage: Arc<dyn CacheStorage>) -> Self {
        Self::with_config(primary_storage, CacheConfig::default())
    }

    pub fn with_config(primary_storage: Arc<dyn CacheStorage>, config: CacheConfig) -> Self {
        Self {
            primary_storage,
            secondary_storage: None,
            config,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// In-memory cache, mostly for tests and one-off runs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::storage::MemoryStorage::new()))
    }

    /// Add secondary storage (L2 cache)
    pub fn with_secondary_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.secondary_storage = Some(storage);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    /// Store a value, replacing whatever the key held before.
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let timer = OperationTimer::start();

        let json_value = serde_json::to_value(value).map_err(|e| CacheError::Serialization {
            message: e.to_string(),
        })?;

        self.primary_storage.set(key, &json_value).await?;

        if let Some(ref secondary) = self.secondary_storage {
            secondary.set(key, &json_value).await?;
        }

        if self.config.enable_metrics {
            self.metrics.record_store(timer.elapsed());
        }
        debug!(namespace = namespace_label(key), "Cache store");
        Ok(())
    }

    /// Retrieve a value. A miss is `Ok(None)`; a stored value that does not
    /// decode as `T` is a [`CacheError::Deserialization`].
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let timer = OperationTimer::start();

        if let Some(json_value) = self.primary_storage.get(key).await? {
            let value = decode(key, json_value)?;
            if self.config.enable_metrics {
                self.metrics.record_hit(timer.elapsed());
            }
            debug!(namespace = namespace_label(key), "Cache hit");
            return Ok(Some(value));
        }

        if let Some(ref secondary) = self.secondary_storage {
            if let Some(json_value) = secondary.get(key).await? {
                if self.config.promote_on_hit {
                    if let Err(err) = self.primary_storage.set(key, &json_value).await {
                        warn!(key, error = %err, "Failed to promote cache entry");
                    } else if self.config.enable_metrics {
                        self.metrics.record_promotion();
                    }
                }

                let value = decode(key, json_value)?;
                if self.config.enable_metrics {
                    self.metrics.record_hit(timer.elapsed());
                }
                debug!(namespace = namespace_label(key), level = "secondary", "Cache hit");
                return Ok(Some(value));
            }
        }

        if self.config.enable_metrics {
            self.metrics.record_miss(timer.elapsed());
        }
        debug!(namespace = namespace_label(key), "Cache miss");
        Ok(None)
    }

    /// Check if a key exists at any level
    pub async fn contains(&self, key: &str) -> Result<bool> {
        if self.primary_storage.contains(key).await? {
            return Ok(true);
        }

        if let Some(ref secondary) = self.secondary_storage {
            return secondary.contains(key).await;
        }

        Ok(false)
    }

    /// Remove a key from all levels. Returns whether any level held it.
    pub async fn unset(&self, key: &str) -> Result<bool> {
        let mut removed = self.primary_storage.remove(key).await?;

        if let Some(ref secondary) = self.secondary_storage {
            removed |= secondary.remove(key).await?;
        }

        if removed && self.config.enable_metrics {
            self.metrics.record_removal();
        }
        Ok(removed)
    }

    /// Remove every key in `namespace` from all levels, returning the number
    /// of distinct keys removed.
    pub async fn clear_namespace(&self, namespace: Namespace) -> Result<usize> {
        let prefix = namespace.prefix();

        let mut keys: Vec<String> = self
            .primary_storage
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(&prefix))
            .collect();
        if let Some(ref secondary) = self.secondary_storage {
            keys.extend(
                secondary
                    .keys()
                    .await?
                    .into_iter()
                    .filter(|key| key.starts_with(&prefix)),
            );
        }
        keys.sort();
        keys.dedup();

        let mut removed = 0;
        for key in &keys {
            if self.unset(key).await? {
                removed += 1;
            }
        }

        debug!(namespace = namespace.as_str(), removed, "Cleared cache namespace");
        Ok(removed)
    }

    /// Clear all cache levels
    pub async fn clear(&self) -> Result<()> {
        self.primary_storage.clear().await?;

        if let Some(ref secondary) = self.secondary_storage {
            secondary.clear().await?;
        }

        Ok(())
    }

    /// Number of entries in the primary level
    pub async fn len(&self) -> Result<usize> {
        self.primary_storage.len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CacheError::Deserialization {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn namespace_label(key: &str) -> &'static str {
    Namespace::of_key(key)
        .map(|ns| ns.as_str())
        .unwrap_or("other")
}

/// Builder pattern for cache construction
pub struct CacheBuilder {
    config: CacheConfig,
    primary_storage: Option<Arc<dyn CacheStorage>>,
    secondary_storage: Option<Arc<dyn CacheStorage>>,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            primary_storage: None,
            secondary_storage: None,
        }
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Set primary storage (required)
    pub fn primary_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.primary_storage = Some(storage);
        self
    }

    pub fn secondary_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.secondary_storage = Some(storage);
        self
    }

    pub fn build(self) -> Result<Cache> {
        let primary_storage = self.primary_storage.ok_or_else(|| CacheError::Storage {
            message: "Primary storage is required".to_string(),
        })?;

        let mut cache = Cache::with_config(primary_storage, self.config);
        if let Some(secondary) = self.secondary_storage {
            cache = cache.with_secondary_storage(secondary);
        }

        Ok(cache)
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}
