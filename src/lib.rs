//! # Layer Tiles
//!
//! A vector tile and feature server for spatial layers stored in PostGIS.
//!
//! Tiles are rendered by the storage engine and cached under keys that embed
//! the layer's version, so updating a layer moves readers onto fresh keys
//! without any explicit invalidation. Feature queries accept attribute
//! filters as `key:value` strings and turn them into parameterized SQL.
//!
//! ## Features
//!
//! - **Versioned tile cache**: cache-aside with an in-process LRU or Redis
//! - **HTTP caching**: strong ETag and `Cache-Control` on every tile
//! - **Dynamic filters**: bounded, injection-safe attribute predicates
//! - **Authentication**: Optional HMAC-SHA256 signed URL authentication
//!
//! ## Architecture
//!
//! - [`cache`] - Cache store contract, key scheme, memory and Redis stores
//! - [`store`] - Spatial store contract and the PostGIS implementation
//! - [`tile`] - Version resolver and cache-aside tile service
//! - [`feature`] - Filter builder and feature collection service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use layer_tiles::{create_router, FeatureService, MemoryStore, PostgisStore, RouterConfig, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(PostgisStore::connect("postgres://tiles@localhost/gis", 16)?);
//!     let cache = Arc::new(MemoryStore::new());
//!
//!     let router = create_router(
//!         TileService::new(Arc::clone(&store), cache),
//!         FeatureService::new(store),
//!         RouterConfig::new("my-secret-key"),
//!     );
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod feature;
pub mod server;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use cache::{
    tile_key, version_key, CacheBackend, CacheStore, MemoryStore, RedisStore, DEFAULT_TILE_TTL,
    DEFAULT_VERSION_TTL,
};
pub use config::{CheckConfig, Cli, Command, ServeConfig, SignConfig, SignOutputFormat};
pub use error::{CacheError, FeatureError, FilterError, QueryError, TileError};
pub use feature::{
    build_predicates, Feature, FeatureCollection, FeatureRequest, FeatureService, FilterPredicate,
    MAX_FILTERS, MAX_FILTER_VALUE_LEN,
};
pub use server::{
    auth_middleware, create_router, AppState, AuthError, ErrorResponse, HealthResponse,
    RouterConfig, SignedUrlAuth,
};
pub use store::{
    BoundingBox, FeatureQuery, FeatureRow, Layer, PostgisStore, SpatialStore, TileCoord,
};
pub use tile::{etag_for, TileResponse, TileService, TileServiceConfig, VersionResolver};
