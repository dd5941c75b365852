//! Tile cache store.
//!
//! The cache holds opaque byte payloads under string keys with a TTL. Two
//! entry classes share one store: tile payloads (long TTL) and layer version
//! stamps (short TTL). Entries are never invalidated explicitly; a layer
//! update changes its version, which changes every tile key of that layer,
//! and the orphaned entries age out.
//!
//! # Components
//!
//! - [`CacheStore`]: `get` / `set` contract, both independently failable
//! - [`MemoryStore`]: in-process LRU with TTL and byte-size bound
//! - [`RedisStore`]: shared store for multi-instance deployments
//! - [`CacheBackend`]: runtime choice between the two
//! - [`tile_key`], [`version_key`]: the key scheme

mod keys;
mod memory;
mod redis_store;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::error::CacheError;

pub use keys::{
    tile_key, tile_key_prefix, version_key, KEY_DELIMITER, TILE_KEY_PREFIX, VERSION_KEY_PREFIX,
};
pub use memory::{MemoryStore, DEFAULT_MEMORY_CACHE_CAPACITY};
pub use redis_store::RedisStore;

/// Default TTL for tile payloads (1 day).
pub const DEFAULT_TILE_TTL: Duration = Duration::from_secs(86_400);

/// Default TTL for layer version stamps (1 hour).
pub const DEFAULT_VERSION_TTL: Duration = Duration::from_secs(3_600);

/// Default timeout for cache store calls.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default bound on reaching a shared cache store at startup.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Key/value store for cached payloads.
///
/// Implementations must be safe to share across request tasks. Writes are
/// plain overwrites, so concurrent writers of the same key are harmless.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the payload stored under `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store `data` under `key` for `ttl`.
    async fn set(&self, key: &str, data: Bytes, ttl: Duration) -> Result<(), CacheError>;
}

/// Cache store selected at startup.
pub enum CacheBackend {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl CacheBackend {
    /// Redis at `redis_url` if it answers within `connect_timeout`, otherwise
    /// an in-process store of `memory_capacity` bytes.
    ///
    /// Never fails: an unreachable or malformed Redis URL is logged and the
    /// server runs on the in-process store.
    pub async fn connect(
        redis_url: Option<&str>,
        memory_capacity: usize,
        connect_timeout: Duration,
    ) -> Self {
        if let Some(url) = redis_url {
            match RedisStore::connect_within(url, connect_timeout).await {
                Ok(store) => return CacheBackend::Redis(store),
                Err(e) => warn!(
                    error = %e,
                    "Redis cache unavailable, falling back to the in-process cache"
                ),
            }
        }
        CacheBackend::Memory(MemoryStore::with_capacity(memory_capacity))
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            CacheBackend::Memory(_) => "memory",
            CacheBackend::Redis(_) => "redis",
        }
    }
}

#[async_trait]
impl CacheStore for CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        match self {
            CacheBackend::Memory(store) => store.get(key).await,
            CacheBackend::Redis(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, data: Bytes, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Memory(store) => store.set(key, data, ttl).await,
            CacheBackend::Redis(store) => store.set(key, data, ttl).await,
        }
    }
}

/// Run a cache call, failing with [`CacheError::Timeout`] after `timeout`.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    }
}
