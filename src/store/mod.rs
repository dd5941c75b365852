//! Spatial storage engine access.
//!
//! The storage engine owns layers and features. This module defines what the
//! tile and feature paths need from it ([`SpatialStore`]), the data model
//! shared with the HTTP layer, and the PostGIS implementation.
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐
//! │ TileService  │   │ FeatureService │
//! └──────┬───────┘   └───────┬────────┘
//!        │ layer_version     │ query_features
//!        │ render_tile       │ list_layers / get_layer
//!        ▼                   ▼
//! ┌─────────────────────────────────────┐
//! │        SpatialStore (trait)         │
//! └──────────────────┬──────────────────┘
//!                    ▼
//! ┌─────────────────────────────────────┐
//! │   PostgisStore (deadpool + SQL)     │
//! └─────────────────────────────────────┘
//! ```

mod postgis;
mod sql;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::QueryError;

pub use postgis::{PostgisStore, DEFAULT_POOL_SIZE};
pub use sql::{FeatureQuery, SqlParam, FEATURES_BASE_SQL, LAYER_VERSION_SQL, TILE_SQL};

/// Default number of features returned by a feature query.
pub const DEFAULT_FEATURE_LIMIT: u32 = 5000;

/// Default timeout for storage engine calls.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Highest zoom level of the tiling scheme.
pub const MAX_ZOOM: u32 = 30;

// =============================================================================
// Data Model
// =============================================================================

/// Tile address in the Web Mercator tiling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Whether the tile exists in the scheme: `z <= 30` and `x, y < 2^z`.
    ///
    /// Tiles outside the grid cover no area and render as empty payloads.
    pub fn is_within_grid(&self) -> bool {
        if self.z > MAX_ZOOM {
            return false;
        }
        let tiles = 1u64 << self.z;
        u64::from(self.x) < tiles && u64::from(self.y) < tiles
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Geographic bounding box in EPSG:4326.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    /// Parse `xmin,ymin,xmax,ymax`.
    ///
    /// Returns `None` unless there are exactly four finite numbers with
    /// `xmin < xmax` and `ymin < ymax`.
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok())
            .collect::<Option<_>>()?;

        let [xmin, ymin, xmax, ymax] = <[f64; 4]>::try_from(parts).ok()?;
        if ![xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite()) {
            return None;
        }
        if xmin >= xmax || ymin >= ymax {
            return None;
        }

        Some(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }
}

/// A layer as listed by the catalogue endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub id: i64,

    /// Identifier stable across environments
    pub public_id: String,

    pub name: String,

    pub description: Option<String>,

    pub owner_id: Option<i64>,

    /// Extent as a GeoJSON polygon
    pub bbox: Option<serde_json::Value>,

    /// Last modification time (ISO-8601, UTC)
    pub updated_at: Option<String>,

    /// Version stamp derived from `updated_at`
    pub version: u64,
}

/// A feature row returned by a feature query.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub id: i64,

    /// Free-form attribute map (a JSON object)
    pub properties: serde_json::Value,

    /// Geometry as a GeoJSON object
    pub geometry: serde_json::Value,
}

// =============================================================================
// Spatial Store
// =============================================================================

/// Query interface of the spatial storage engine.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Version stamp of a layer: its last-modified time in epoch seconds.
    ///
    /// Returns 0 when the layer has no timestamp or does not exist.
    async fn layer_version(&self, layer_id: i64) -> Result<u64, QueryError>;

    /// Encode the features of `layer_id` intersecting `coord` as a vector tile.
    ///
    /// An empty intersection yields an empty payload.
    async fn render_tile(&self, layer_id: i64, coord: TileCoord) -> Result<Bytes, QueryError>;

    /// Fetch the features matching `query`, ordered by id.
    async fn query_features(&self, query: &FeatureQuery) -> Result<Vec<FeatureRow>, QueryError>;

    /// All layers, ordered by id.
    async fn list_layers(&self) -> Result<Vec<Layer>, QueryError>;

    async fn get_layer(&self, layer_id: i64) -> Result<Option<Layer>, QueryError>;
}

/// Run a storage engine call, failing with [`QueryError::Timeout`] after `timeout`.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    }
}
