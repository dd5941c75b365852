//! Tile endpoint integration tests.
//!
//! Tests verify:
//! - Versioned cache keys and cache-aside population
//! - ETag and Cache-Control headers, conditional requests
//! - Degradation when the cache store fails
//! - Status codes for storage engine failures

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use layer_tiles::cache::{CacheStore, MemoryStore};
use layer_tiles::error::QueryError;
use layer_tiles::tile::{etag_for, TileServiceConfig};

use super::test_utils::{
    body_bytes, body_json, get, get_with_header, header, test_router, FlakyCache,
    MockSpatialStore, SAMPLE_TILE,
};

const LAYER_VERSION: u64 = 1_700_000_000;

fn short_version_ttl() -> TileServiceConfig {
    TileServiceConfig {
        version_ttl: Duration::ZERO,
        ..Default::default()
    }
}

// =============================================================================
// Cache-Aside
// =============================================================================

#[tokio::test]
async fn test_tile_miss_populates_versioned_key() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let cache = Arc::new(MemoryStore::new());
    let router = test_router(Arc::clone(&store), Arc::clone(&cache), Default::default());

    let response = get(&router, "/tiles/layer/7/3/1/2.mvt").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-type"),
        "application/vnd.mapbox-vector-tile"
    );
    assert_eq!(header(&response, "cache-control"), "public, max-age=86400");
    assert_eq!(header(&response, "etag"), etag_for(SAMPLE_TILE));
    assert_eq!(header(&response, "x-tile-cache-hit"), "false");
    assert_eq!(header(&response, "x-layer-version"), "1700000000");
    assert_eq!(body_bytes(response).await.as_ref(), SAMPLE_TILE);

    let cached = cache.get("tile:7:v1700000000:3:1:2").await.unwrap();
    assert_eq!(cached.as_deref(), Some(SAMPLE_TILE));
    assert_eq!(
        cache.get("layer_version:7").await.unwrap().as_deref(),
        Some(&b"1700000000"[..])
    );
    assert_eq!(store.render_calls(), 1);
}

#[tokio::test]
async fn test_tile_hit_is_identical_and_skips_store() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let router = test_router(
        Arc::clone(&store),
        Arc::new(MemoryStore::new()),
        Default::default(),
    );

    let first = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    let first_etag = header(&first, "etag").to_string();
    let first_body = body_bytes(first).await;

    let second = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-tile-cache-hit"), "true");
    assert_eq!(header(&second, "etag"), first_etag);
    assert_eq!(body_bytes(second).await, first_body);

    assert_eq!(store.render_calls(), 1);
    assert_eq!(store.version_calls(), 1);
}

#[tokio::test]
async fn test_tile_without_mvt_extension() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let router = test_router(store, Arc::new(MemoryStore::new()), Default::default());

    let response = get(&router, "/tiles/layer/7/3/1/2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.as_ref(), SAMPLE_TILE);
}

#[tokio::test]
async fn test_layer_update_moves_to_new_key() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let cache = Arc::new(MemoryStore::new());
    let router = test_router(Arc::clone(&store), Arc::clone(&cache), short_version_ttl());

    let old = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    let old_etag = header(&old, "etag").to_string();

    store.set_version(LAYER_VERSION + 60);
    store.set_tile(&b"updated"[..]);

    let new = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    assert_eq!(header(&new, "x-tile-cache-hit"), "false");
    assert_eq!(header(&new, "x-layer-version"), "1700000060");
    assert_ne!(header(&new, "etag"), old_etag);
    assert_eq!(body_bytes(new).await.as_ref(), b"updated");

    assert!(cache.get("tile:7:v1700000060:3:1:2").await.unwrap().is_some());
    // The previous version's entry is orphaned, not deleted.
    assert!(cache.get("tile:7:v1700000000:3:1:2").await.unwrap().is_some());
    assert_eq!(store.render_calls(), 2);
}

#[tokio::test]
async fn test_cached_version_serves_stale_until_expiry() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let router = test_router(
        Arc::clone(&store),
        Arc::new(MemoryStore::new()),
        Default::default(),
    );

    get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    store.set_version(LAYER_VERSION + 60);

    let response = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    assert_eq!(header(&response, "x-layer-version"), "1700000000");
    assert_eq!(header(&response, "x-tile-cache-hit"), "true");
}

#[tokio::test]
async fn test_empty_tile_is_valid_and_cached() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    store.set_tile(&b""[..]);
    let cache = Arc::new(MemoryStore::new());
    let router = test_router(Arc::clone(&store), Arc::clone(&cache), Default::default());

    let response = get(&router, "/tiles/layer/7/0/0/0.mvt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "etag"),
        "\"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\""
    );
    assert!(body_bytes(response).await.is_empty());

    let cached = cache.get("tile:7:v1700000000:0:0:0").await.unwrap();
    assert_eq!(cached.as_deref(), Some(&b""[..]));

    let again = get(&router, "/tiles/layer/7/0/0/0.mvt").await;
    assert_eq!(header(&again, "x-tile-cache-hit"), "true");
    assert_eq!(store.render_calls(), 1);
}

// =============================================================================
// Conditional Requests
// =============================================================================

#[tokio::test]
async fn test_if_none_match_returns_not_modified() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let router = test_router(store, Arc::new(MemoryStore::new()), Default::default());

    let etag = etag_for(SAMPLE_TILE);
    let response = get_with_header(&router, "/tiles/layer/7/3/1/2.mvt", "if-none-match", &etag).await;

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header(&response, "etag"), etag);
    assert_eq!(header(&response, "cache-control"), "public, max-age=86400");
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_stale_if_none_match_returns_tile() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let router = test_router(store, Arc::new(MemoryStore::new()), Default::default());

    let response = get_with_header(
        &router,
        "/tiles/layer/7/3/1/2.mvt",
        "if-none-match",
        "\"0000\"",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.as_ref(), SAMPLE_TILE);
}

// =============================================================================
// Cache Store Failures
// =============================================================================

#[tokio::test]
async fn test_cache_write_failure_is_invisible() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let cache = Arc::new(FlakyCache::new());
    cache.fail_set(true);
    let router = test_router(Arc::clone(&store), Arc::clone(&cache), Default::default());

    let response = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "etag"), etag_for(SAMPLE_TILE));
    assert_eq!(body_bytes(response).await.as_ref(), SAMPLE_TILE);

    assert!(cache.inner().is_empty().await);
}

#[tokio::test]
async fn test_cache_read_failure_falls_back_to_store() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let cache = Arc::new(FlakyCache::new());
    let router = test_router(Arc::clone(&store), Arc::clone(&cache), Default::default());

    get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    cache.fail_get(true);

    let response = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-tile-cache-hit"), "false");
    assert_eq!(header(&response, "x-layer-version"), "1700000000");
    assert_eq!(body_bytes(response).await.as_ref(), SAMPLE_TILE);

    assert_eq!(store.version_calls(), 2);
    assert_eq!(store.render_calls(), 2);
}

// =============================================================================
// Storage Engine Failures
// =============================================================================

#[tokio::test]
async fn test_store_unavailable_is_503() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    store.fail_with(QueryError::StoreUnavailable("pool exhausted".to_string()));
    let router = test_router(store, Arc::new(MemoryStore::new()), Default::default());

    let response = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["error"], "store_unavailable");
    assert_eq!(body["status"], 503);
}

#[tokio::test]
async fn test_render_failure_is_500_and_not_cached() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let cache = Arc::new(MemoryStore::new());
    let router = test_router(Arc::clone(&store), Arc::clone(&cache), Default::default());

    // Resolve and cache the version first so only the render fails.
    get(&router, "/tiles/layer/7/0/0/0.mvt").await;
    store.fail_with(QueryError::Failed("ST_AsMVT failed".to_string()));

    let response = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "query_failed");

    assert!(cache.get("tile:7:v1700000000:3:1:2").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_is_504() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    store.delay_by(Duration::from_secs(30));
    let config = TileServiceConfig {
        query_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let router = test_router(store, Arc::new(MemoryStore::new()), config);

    let response = get(&router, "/tiles/layer/7/3/1/2.mvt").await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["error"], "query_timeout");
}

// =============================================================================
// Path Validation
// =============================================================================

#[tokio::test]
async fn test_non_numeric_coordinate_is_400() {
    let store = Arc::new(MockSpatialStore::new(LAYER_VERSION));
    let router = test_router(
        Arc::clone(&store),
        Arc::new(MemoryStore::new()),
        Default::default(),
    );

    for uri in [
        "/tiles/layer/seven/3/1/2.mvt",
        "/tiles/layer/7/z/1/2.mvt",
        "/tiles/layer/7/3/-1/2.mvt",
        "/tiles/layer/7/3/1/2.png",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_json(response).await["error"], "invalid_coordinate");
    }

    assert_eq!(store.version_calls(), 0);
}
