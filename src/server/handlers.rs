//! HTTP request handlers.
//!
//! # Endpoints
//!
//! - `GET /tiles/layer/{layer_id}/{z}/{x}/{y}.mvt` - Vector tile
//! - `GET /layers` - Layer catalogue
//! - `GET /layers/{layer_id}` - Single layer
//! - `GET /layers/{layer_id}/features` - Filtered GeoJSON features
//! - `GET /health` - Health check

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use url::form_urlencoded;

use crate::cache::CacheStore;
use crate::error::{FeatureError, QueryError, TileError};
use crate::feature::{FeatureCollection, FeatureRequest, FeatureService};
use crate::store::{Layer, SpatialStore, TileCoord};
use crate::tile::{TileResponse, TileService, MVT_CONTENT_TYPE};

/// Header reporting whether the tile came from the cache.
pub const TILE_CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");

/// Header carrying the layer version the tile was resolved under.
pub const LAYER_VERSION_HEADER: HeaderName = HeaderName::from_static("x-layer-version");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state, passed to handlers via Axum's State extractor.
pub struct AppState<S: SpatialStore, C: CacheStore> {
    pub tile_service: Arc<TileService<S, C>>,

    pub feature_service: Arc<FeatureService<S>>,
}

impl<S: SpatialStore, C: CacheStore> AppState<S, C> {
    pub fn new(tile_service: TileService<S, C>, feature_service: FeatureService<S>) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            feature_service: Arc::new(feature_service),
        }
    }
}

impl<S: SpatialStore, C: CacheStore> Clone for AppState<S, C> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            feature_service: Arc::clone(&self.feature_service),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from `/tiles/layer/{layer_id}/{z}/{x}/{filename}` where
/// filename is `{y}` or `{y}.mvt`. Segments are kept as text so that a
/// non-numeric value gets a JSON error body.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub layer_id: String,
    pub z: String,
    pub x: String,
    pub filename: String,
}

impl TilePathParams {
    /// Parse into a layer id and tile coordinate.
    pub fn parse(&self) -> Result<(i64, TileCoord), TileError> {
        let y = self.filename.strip_suffix(".mvt").unwrap_or(&self.filename);
        let layer_id = parse_number(&self.layer_id)?;
        let coord = TileCoord::new(parse_number(&self.z)?, parse_number(&self.x)?, parse_number(y)?);
        Ok((layer_id, coord))
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T, TileError> {
    value.parse().map_err(|_| TileError::InvalidCoordinate {
        value: value.to_string(),
    })
}

fn parse_layer_id(value: &str) -> Result<i64, FeatureError> {
    value.parse().map_err(|_| FeatureError::InvalidParameter {
        name: "layer_id",
        value: value.to_string(),
    })
}

/// Collect the feature query parameters from a raw query string.
///
/// `filter` may repeat; `sig` and `exp` belong to authentication and any
/// other parameter is ignored.
pub fn parse_feature_query(layer_id: i64, query: &str) -> Result<FeatureRequest, FeatureError> {
    let mut request = FeatureRequest {
        layer_id,
        ..Default::default()
    };

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match &*key {
            "filter" => request.filters.push(value.into_owned()),
            "bbox" => request.bbox = Some(value.into_owned()),
            "limit" => {
                let limit = value.parse().map_err(|_| FeatureError::InvalidParameter {
                    name: "limit",
                    value: value.to_string(),
                })?;
                request.limit = Some(limit);
            }
            _ => {}
        }
    }

    Ok(request)
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_filter")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Log by severity and build the JSON error response.
///
/// 5xx at ERROR, 404 at DEBUG (common and expected), other 4xx at WARN.
fn error_response(status: StatusCode, error_type: &'static str, message: String) -> Response {
    if status.is_server_error() {
        error!(error_type, status = status.as_u16(), "Server error: {}", message);
    } else if status == StatusCode::NOT_FOUND {
        debug!(error_type, status = status.as_u16(), "Resource not found: {}", message);
    } else {
        warn!(error_type, status = status.as_u16(), "Client error: {}", message);
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

fn query_status(err: &QueryError) -> (StatusCode, &'static str) {
    match err {
        QueryError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        QueryError::Failed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "query_failed"),
        QueryError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "query_timeout"),
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error_type) = query_status(&self);
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        match self {
            TileError::Query(err) => err.into_response(),
            TileError::InvalidCoordinate { .. } => {
                error_response(StatusCode::BAD_REQUEST, "invalid_coordinate", self.to_string())
            }
        }
    }
}

impl IntoResponse for FeatureError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            FeatureError::Filter(_) => (StatusCode::BAD_REQUEST, "invalid_filter"),
            FeatureError::InvalidBbox { .. } => (StatusCode::BAD_REQUEST, "invalid_bbox"),
            FeatureError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, "invalid_parameter"),
            FeatureError::LayerNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            FeatureError::Query(err) => query_status(err),
        };
        error_response(status, error_type, self.to_string())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/layer/{layer_id}/{z}/{x}/{y}.mvt` (the `.mvt` suffix is optional)
///
/// # Response
///
/// - `200 OK`: vector tile, possibly zero-length
/// - `304 Not Modified`: `If-None-Match` matched the tile's ETag
/// - `400 Bad Request`: non-numeric path segment
/// - `500`/`503`/`504`: storage engine failure
///
/// # Headers
///
/// - `Content-Type: application/vnd.mapbox-vector-tile`
/// - `Cache-Control: public, max-age={tile_ttl}`
/// - `ETag: "{sha256}"`
/// - `X-Tile-Cache-Hit: true|false`
/// - `X-Layer-Version: {version}`
pub async fn tile_handler<S, C>(
    State(state): State<AppState<S, C>>,
    Path(params): Path<TilePathParams>,
    headers: HeaderMap,
) -> Result<Response, TileError>
where
    S: SpatialStore + 'static,
    C: CacheStore + 'static,
{
    let (layer_id, coord) = params.parse()?;
    let tile = state.tile_service.get_tile(layer_id, coord).await?;

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| etag_matches(value, &tile.etag));

    if not_modified {
        debug!(layer_id, tile = %coord, "Tile not modified");
        return Ok((StatusCode::NOT_MODIFIED, tile_headers(&tile)).into_response());
    }

    let response_headers = tile_headers(&tile);
    Ok((response_headers, Body::from(tile.data)).into_response())
}

fn tile_headers(tile: &TileResponse) -> [(HeaderName, String); 5] {
    [
        (header::CONTENT_TYPE, MVT_CONTENT_TYPE.to_string()),
        (header::CACHE_CONTROL, tile.cache_control()),
        (header::ETAG, tile.etag.clone()),
        (TILE_CACHE_HIT_HEADER, tile.cache_hit.to_string()),
        (LAYER_VERSION_HEADER, tile.version.to_string()),
    ]
}

/// Whether an `If-None-Match` value matches `etag`.
///
/// Uses weak comparison: `W/"abc"` matches `"abc"`. `*` matches anything.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// Handle feature collection requests.
///
/// # Endpoint
///
/// `GET /layers/{layer_id}/features`
///
/// # Query Parameters
///
/// - `filter`: `key:value`, repeatable (at most 20, values at most 200 characters)
/// - `bbox`: `xmin,ymin,xmax,ymax` in EPSG:4326
/// - `limit`: maximum number of features
///
/// # Response
///
/// `200 OK` with a GeoJSON `FeatureCollection`, empty when nothing matches.
/// Invalid filters, bbox or limit give `400 Bad Request` naming the culprit.
pub async fn features_handler<S, C>(
    State(state): State<AppState<S, C>>,
    Path(layer_id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<FeatureCollection>, FeatureError>
where
    S: SpatialStore + 'static,
    C: CacheStore + 'static,
{
    let layer_id = parse_layer_id(&layer_id)?;
    let request = parse_feature_query(layer_id, query.as_deref().unwrap_or(""))?;
    let collection = state.feature_service.get_features(request).await?;
    Ok(Json(collection))
}

/// Handle layer catalogue requests: `GET /layers`.
pub async fn layers_handler<S, C>(
    State(state): State<AppState<S, C>>,
) -> Result<Json<Vec<Layer>>, QueryError>
where
    S: SpatialStore + 'static,
    C: CacheStore + 'static,
{
    Ok(Json(state.feature_service.list_layers().await?))
}

/// Handle single layer requests: `GET /layers/{layer_id}`.
pub async fn layer_handler<S, C>(
    State(state): State<AppState<S, C>>,
    Path(layer_id): Path<String>,
) -> Result<Json<Layer>, FeatureError>
where
    S: SpatialStore + 'static,
    C: CacheStore + 'static,
{
    let layer_id = parse_layer_id(&layer_id)?;
    Ok(Json(state.feature_service.get_layer(layer_id).await?))
}

/// Handle health check requests.
///
/// `200 OK` with `{"status": "healthy", "version": "0.1.0"}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
