//! Cache-aside tile service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          TileService                            │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                       get_tile()                          │  │
//! │  │  1. Resolve version   4. Render on miss                   │  │
//! │  │  2. Compute key       5. Populate cache (best effort)     │  │
//! │  │  3. Cache lookup      6. ETag & return                    │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │  ┌─────────────────┐    ┌────────────┐    ┌──────────────────┐  │
//! │  │ VersionResolver │    │ CacheStore │    │   SpatialStore   │  │
//! │  └─────────────────┘    └────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the storage engine can fail a request. Cache reads that fail are
//! misses and cache writes that fail leave the tile served but uncached.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::{
    self, tile_key, CacheStore, DEFAULT_CACHE_TIMEOUT, DEFAULT_TILE_TTL, DEFAULT_VERSION_TTL,
};
use crate::error::TileError;
use crate::store::{self, SpatialStore, TileCoord, DEFAULT_QUERY_TIMEOUT};

use super::version::VersionResolver;

/// Content type of Mapbox vector tiles.
pub const MVT_CONTENT_TYPE: &str = "application/vnd.mapbox-vector-tile";

// =============================================================================
// Configuration
// =============================================================================

/// Tunables of the tile path.
#[derive(Debug, Clone)]
pub struct TileServiceConfig {
    /// TTL of cached tiles, also advertised as `max-age`
    pub tile_ttl: Duration,

    /// TTL of cached layer versions
    pub version_ttl: Duration,

    pub query_timeout: Duration,

    pub cache_timeout: Duration,

    /// Whether zero-length tiles are cached
    pub cache_empty_tiles: bool,
}

impl Default for TileServiceConfig {
    fn default() -> Self {
        Self {
            tile_ttl: DEFAULT_TILE_TTL,
            version_ttl: DEFAULT_VERSION_TTL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            cache_empty_tiles: true,
        }
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// A tile with its validation metadata.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Encoded vector tile, possibly empty
    pub data: Bytes,

    /// Quoted content hash of `data`
    pub etag: String,

    /// Layer version the tile was resolved under
    pub version: u64,

    /// Whether `data` came from the cache
    pub cache_hit: bool,

    /// Seconds clients may reuse the tile
    pub max_age: u64,
}

impl TileResponse {
    /// `Cache-Control` header value.
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.max_age)
    }
}

/// Strong ETag for a tile payload: the quoted hex SHA-256 of its bytes.
///
/// Depends on the content only, so identical bytes always produce the same
/// tag regardless of layer, coordinate or cache state.
///
/// # Example
///
/// ```
/// use layer_tiles::tile::etag_for;
///
/// let tag = etag_for(b"");
/// assert_eq!(
///     tag,
///     "\"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\""
/// );
/// ```
pub fn etag_for(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(data)))
}

// =============================================================================
// Tile Service
// =============================================================================

/// Serves vector tiles through a versioned cache.
///
/// # Type Parameters
///
/// * `S` - The spatial store rendering tiles
/// * `C` - The cache store holding tiles and layer versions
pub struct TileService<S: SpatialStore, C: CacheStore> {
    store: Arc<S>,
    cache: Arc<C>,
    versions: VersionResolver<S, C>,
    config: TileServiceConfig,
}

impl<S: SpatialStore, C: CacheStore> TileService<S, C> {
    pub fn new(store: Arc<S>, cache: Arc<C>) -> Self {
        Self::with_config(store, cache, TileServiceConfig::default())
    }

    pub fn with_config(store: Arc<S>, cache: Arc<C>, config: TileServiceConfig) -> Self {
        let versions = VersionResolver::new(Arc::clone(&store), Arc::clone(&cache))
            .with_ttl(config.version_ttl)
            .with_timeouts(config.query_timeout, config.cache_timeout);

        Self {
            store,
            cache,
            versions,
            config,
        }
    }

    /// Fetch a tile, rendering and caching it on a miss.
    ///
    /// # Errors
    ///
    /// Fails only when the storage engine fails to resolve the version or to
    /// render the tile. A render failure is never turned into an empty tile.
    pub async fn get_tile(&self, layer_id: i64, coord: TileCoord) -> Result<TileResponse, TileError> {
        let version = self.versions.resolve(layer_id).await?;
        let key = tile_key(layer_id, version, coord);

        let cached = match cache::bounded(self.config.cache_timeout, self.cache.get(&key)).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(key = %key, error = %e, "Tile cache read failed, rendering");
                None
            }
        };

        let (data, cache_hit) = match cached {
            Some(data) => {
                debug!(key = %key, bytes = data.len(), "Tile cache hit");
                (data, true)
            }
            None => {
                debug!(key = %key, "Tile cache miss");
                let data = store::bounded(
                    self.config.query_timeout,
                    self.store.render_tile(layer_id, coord),
                )
                .await?;

                if !data.is_empty() || self.config.cache_empty_tiles {
                    self.populate(&key, data.clone()).await;
                }
                (data, false)
            }
        };

        Ok(TileResponse {
            etag: etag_for(&data),
            data,
            version,
            cache_hit,
            max_age: self.config.tile_ttl.as_secs(),
        })
    }

    async fn populate(&self, key: &str, data: Bytes) {
        let write = self.cache.set(key, data, self.config.tile_ttl);
        if let Err(e) = cache::bounded(self.config.cache_timeout, write).await {
            warn!(key = %key, error = %e, "Tile cache write failed");
        }
    }
}
