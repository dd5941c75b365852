//! Tile service layer.
//!
//! Sits between the HTTP handlers and the stores:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌─────────────────┐  ┌──────────────┐  │
//! │  │ VersionResolver │  │  tile_key()  │  │
//! │  └─────────────────┘  └──────────────┘  │
//! └──────────┬─────────────────────┬────────┘
//!            │                     │
//!            ▼                     ▼
//! ┌────────────────────┐ ┌──────────────────┐
//! │     CacheStore     │ │   SpatialStore   │
//! └────────────────────┘ └──────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: cache-aside orchestration of a tile request
//! - [`VersionResolver`]: layer version lookup through the cache
//! - [`TileResponse`]: payload plus ETag, version and cache status
//! - [`etag_for`]: content hash used as the ETag

mod service;
mod version;

pub use service::{etag_for, TileResponse, TileService, TileServiceConfig, MVT_CONTENT_TYPE};
pub use version::VersionResolver;
