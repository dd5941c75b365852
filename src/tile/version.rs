//! Layer version resolution.
//!
//! A layer's version is its last-modified time in epoch seconds. It is
//! embedded in every tile key, so an update to the layer moves all of its
//! tiles to fresh keys without touching the old entries.
//!
//! Versions are themselves cached under [`version_key`] with a short TTL.
//! Cache trouble never fails resolution: a read error falls through to the
//! storage engine and a write error is logged and dropped. The version TTL
//! is therefore the upper bound on how long stale tiles can be served after
//! an update.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::{self, version_key, CacheStore, DEFAULT_CACHE_TIMEOUT, DEFAULT_VERSION_TTL};
use crate::error::QueryError;
use crate::store::{self, SpatialStore, DEFAULT_QUERY_TIMEOUT};

/// Resolves layer versions through the cache, falling back to the store.
pub struct VersionResolver<S: SpatialStore, C: CacheStore> {
    store: Arc<S>,
    cache: Arc<C>,
    ttl: Duration,
    query_timeout: Duration,
    cache_timeout: Duration,
}

impl<S: SpatialStore, C: CacheStore> VersionResolver<S, C> {
    pub fn new(store: Arc<S>, cache: Arc<C>) -> Self {
        Self {
            store,
            cache,
            ttl: DEFAULT_VERSION_TTL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    /// TTL of cached version entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_timeouts(mut self, query_timeout: Duration, cache_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self.cache_timeout = cache_timeout;
        self
    }

    /// Current version of `layer_id`.
    ///
    /// A layer that does not exist or has no timestamp resolves to 0. Only a
    /// storage engine failure is returned as an error.
    pub async fn resolve(&self, layer_id: i64) -> Result<u64, QueryError> {
        let key = version_key(layer_id);

        match cache::bounded(self.cache_timeout, self.cache.get(&key)).await {
            Ok(Some(raw)) => match parse_version(&raw) {
                Some(version) => {
                    debug!(layer_id, version, "Layer version cache hit");
                    return Ok(version);
                }
                None => warn!(layer_id, "Ignoring unparseable cached layer version"),
            },
            Ok(None) => debug!(layer_id, "Layer version cache miss"),
            Err(e) => warn!(layer_id, error = %e, "Layer version cache read failed"),
        }

        let version = store::bounded(self.query_timeout, self.store.layer_version(layer_id)).await?;

        let encoded = Bytes::from(version.to_string());
        if let Err(e) = cache::bounded(self.cache_timeout, self.cache.set(&key, encoded, self.ttl)).await
        {
            warn!(layer_id, error = %e, "Layer version cache write failed");
        }

        Ok(version)
    }
}

fn parse_version(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}
