//! Cache-aside read path
//!
//! Reads go to the cache first and fall back to the backing repository,
//! which is the source of truth. Entries are never invalidated implicitly;
//! a stale entry stays until it is overwritten.
//!
//! Concurrent misses for the same key each hit the repository. There is no
//! request coalescing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, warn};

use movieapp_api::Metadata;
use movieapp_common::{MovieAppError, Result};

/// Backing store, the system of record
#[async_trait]
pub trait Repository<V>: Send + Sync {
    /// `NotFound` when the key is absent
    async fn get(&self, key: &str) -> Result<V>;

    async fn put(&self, key: &str, value: V) -> Result<()>;
}

/// Read-through cache in front of a [`Repository`]
#[async_trait]
pub trait Cache<V>: Send + Sync {
    /// `NotFound` on a miss. Any other error is treated as a miss by callers.
    async fn get(&self, key: &str) -> Result<V>;

    async fn put(&self, key: &str, value: V) -> Result<()>;
}

/// Values that carry their own cache key
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Metadata {
    fn key(&self) -> &str {
        &self.id
    }
}

/// In-process cache. Shared reads, exclusive writes.
#[derive(Debug)]
pub struct MemoryCache<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| MovieAppError::NotFound(format!("cache miss: {}", key)))
    }

    async fn put(&self, key: &str, value: V) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Cache-aside controller
pub struct CacheAside<V> {
    name: &'static str,
    cache: Arc<dyn Cache<V>>,
    repository: Arc<dyn Repository<V>>,
}

impl<V> Clone for CacheAside<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            cache: self.cache.clone(),
            repository: self.repository.clone(),
        }
    }
}

impl<V> CacheAside<V>
where
    V: Keyed + Clone + Send + Sync + 'static,
{
    /// `name` labels the cache in metrics
    pub fn new(
        name: &'static str,
        cache: Arc<dyn Cache<V>>,
        repository: Arc<dyn Repository<V>>,
    ) -> Self {
        Self {
            name,
            cache,
            repository,
        }
    }

    /// Serve from cache, otherwise load from the repository and populate.
    ///
    /// A failed cache population is logged and counted but never changes
    /// the result.
    pub async fn get(&self, key: &str) -> Result<V> {
        match self.cache.get(key).await {
            Ok(value) => {
                counter!("cache_hits_total", "cache" => self.name).increment(1);
                return Ok(value);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => debug!("Cache {} lookup for {} failed: {}", self.name, key, e),
        }
        counter!("cache_misses_total", "cache" => self.name).increment(1);

        let value = self.repository.get(key).await?;
        self.populate(key, value.clone()).await;
        Ok(value)
    }

    /// Write to the repository only. A cached copy of the key stays as is.
    pub async fn put(&self, value: V) -> Result<()> {
        let key = value.key().to_string();
        self.repository.put(&key, value).await
    }

    /// Write to the repository, then refresh the cached copy
    pub async fn put_through(&self, value: V) -> Result<()> {
        let key = value.key().to_string();
        self.repository.put(&key, value.clone()).await?;
        self.populate(&key, value).await;
        Ok(())
    }

    async fn populate(&self, key: &str, value: V) {
        if let Err(e) = self.cache.put(key, value).await {
            warn!("Failed to write {} to cache {}: {}", key, self.name, e);
            counter!("cache_write_errors_total", "cache" => self.name).increment(1);
        }
    }
}

/// Repository backed by a concurrent map
#[derive(Debug)]
pub struct MemoryRepository<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> MemoryRepository<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryRepository<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> Repository<V> for MemoryRepository<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| MovieAppError::NotFound(format!("no record for {}", key)))
    }

    async fn put(&self, key: &str, value: V) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}
