//! In-process cache store.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

use super::CacheStore;
use crate::error::CacheError;

/// Default capacity of the in-process store (256MB).
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Upper bound on the number of entries, independent of their size.
const DEFAULT_MAX_ENTRIES: usize = 100_000;

struct Entry {
    data: Bytes,
    expires_at: Instant,
}

/// LRU store with per-entry TTL and a byte-size bound.
///
/// Entries past their expiry are reported as misses and dropped on read.
/// When the total payload size exceeds capacity, least-recently-used entries
/// are evicted. Operations never fail.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use layer_tiles::cache::{CacheStore, MemoryStore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = MemoryStore::with_capacity(1024 * 1024);
///     let ttl = Duration::from_secs(60);
///
///     store.set("tile:1:v1:0:0:0", Bytes::from_static(b"mvt"), ttl).await.unwrap();
///     let cached = store.get("tile:1:v1:0:0:0").await.unwrap();
///     assert_eq!(cached, Some(Bytes::from_static(b"mvt")));
/// }
/// ```
pub struct MemoryStore {
    entries: RwLock<LruCache<String, Entry>>,
    max_size: usize,
    current_size: RwLock<usize>,
}

impl MemoryStore {
    /// Create a store with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    /// Create a store bounded to `max_size` bytes of payload.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a store bounded to `max_size` bytes and `max_entries` entries.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(max_entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Total payload bytes currently stored.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    async fn lookup(&self, key: &str, now: Instant) -> Option<Bytes> {
        let mut entries = self.entries.write().await;

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.data.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            if let Some(entry) = entries.pop(key) {
                let mut current_size = self.current_size.write().await;
                *current_size = current_size.saturating_sub(entry.data.len());
            }
        }
        None
    }

    async fn insert(&self, key: &str, data: Bytes, expires_at: Instant) {
        let data_size = data.len();
        let mut entries = self.entries.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old) = entries.peek(key) {
            *current_size = current_size.saturating_sub(old.data.len());
        }

        // push() reports the entry displaced by the entry-count bound
        if let Some((evicted_key, evicted)) =
            entries.push(key.to_string(), Entry { data, expires_at })
        {
            if evicted_key != key {
                *current_size = current_size.saturating_sub(evicted.data.len());
            }
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            match entries.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.data.len());
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(self.lookup(key, Instant::now()).await)
    }

    async fn set(&self, key: &str, data: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, data, Instant::now() + ttl).await;
        Ok(())
    }
}
