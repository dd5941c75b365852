//! Feature and layer endpoint integration tests.
//!
//! Tests verify:
//! - Filter parameters reach the store as ordered predicates
//! - Filter, bbox and limit validation errors are 400s naming the culprit
//! - GeoJSON output shape
//! - Layer catalogue and 404 for unknown layers

use std::sync::Arc;

use axum::http::StatusCode;

use layer_tiles::cache::MemoryStore;
use layer_tiles::error::QueryError;
use layer_tiles::feature::FilterPredicate;
use layer_tiles::store::BoundingBox;

use super::test_utils::{body_json, get, sample_layer, sample_row, test_router, MockSpatialStore};

fn feature_router(store: &Arc<MockSpatialStore>) -> axum::Router {
    test_router(
        Arc::clone(store),
        Arc::new(MemoryStore::new()),
        Default::default(),
    )
}

fn predicate(key: &str, value: &str) -> FilterPredicate {
    FilterPredicate {
        key: key.to_string(),
        value: value.to_string(),
    }
}

// =============================================================================
// Feature Collections
// =============================================================================

#[tokio::test]
async fn test_features_as_geojson() {
    let store = Arc::new(
        MockSpatialStore::new(1).with_rows(vec![sample_row(1, "oak"), sample_row(2, "oak")]),
    );
    let router = feature_router(&store);

    let response = get(&router, "/layers/7/features?filter=species:oak").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["type"], "FeatureCollection");
    let features = body["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0]["type"], "Feature");
    assert_eq!(features[0]["id"], 1);
    assert_eq!(features[0]["geometry"]["type"], "Point");
    assert_eq!(features[0]["properties"]["species"], "oak");
    assert_eq!(features[1]["id"], 2);
}

#[tokio::test]
async fn test_no_match_is_empty_collection() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    let response = get(&router, "/layers/7/features?filter=species:baobab").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["type"], "FeatureCollection");
    assert!(body["features"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_filters_reach_store_in_order() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    let response = get(
        &router,
        "/layers/7/features?filter=species:oak&filter=note%3Aa%3Ab&filter=species:oak&bbox=2.2,48.8,2.5,48.9&limit=10",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let query = store.last_query().unwrap();
    assert_eq!(query.layer_id, 7);
    assert_eq!(
        query.predicates,
        vec![
            predicate("species", "oak"),
            predicate("note", "a:b"),
            predicate("species", "oak"),
        ]
    );
    assert_eq!(
        query.bbox,
        Some(BoundingBox {
            xmin: 2.2,
            ymin: 48.8,
            xmax: 2.5,
            ymax: 48.9,
        })
    );
    assert_eq!(query.limit, 10);
}

#[tokio::test]
async fn test_hostile_filter_is_passed_as_data() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    let response = get(
        &router,
        "/layers/7/features?filter=name%27%3B%20DROP%20TABLE%20layers%3B--:x",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let query = store.last_query().unwrap();
    assert_eq!(
        query.predicates,
        vec![predicate("name'; DROP TABLE layers;--", "x")]
    );
}

#[tokio::test]
async fn test_limit_is_clamped() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    get(&router, "/layers/7/features?limit=100000").await;
    assert_eq!(store.last_query().unwrap().limit, 100);

    get(&router, "/layers/7/features?limit=0").await;
    assert_eq!(store.last_query().unwrap().limit, 1);

    get(&router, "/layers/7/features").await;
    assert_eq!(store.last_query().unwrap().limit, 100);
}

// =============================================================================
// Validation Errors
// =============================================================================

#[tokio::test]
async fn test_too_many_filters_is_400() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    let query: Vec<String> = (0..21).map(|i| format!("filter=k{i}:v")).collect();
    let response = get(&router, &format!("/layers/7/features?{}", query.join("&"))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_filter");
    assert!(body["message"].as_str().unwrap().contains("21"));
    assert!(store.last_query().is_none());
}

#[tokio::test]
async fn test_twenty_filters_accepted() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    let query: Vec<String> = (0..20).map(|i| format!("filter=k{i}:v")).collect();
    let response = get(&router, &format!("/layers/7/features?{}", query.join("&"))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.last_query().unwrap().predicates.len(), 20);
}

#[tokio::test]
async fn test_malformed_filter_is_400() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    for filter in ["speciesoak", ":oak"] {
        let response = get(&router, &format!("/layers/7/features?filter={filter}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{filter}");

        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_filter");
        assert!(body["message"].as_str().unwrap().contains(filter));
    }
    assert!(store.last_query().is_none());
}

#[tokio::test]
async fn test_long_filter_value_is_400() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    let ok = format!("/layers/7/features?filter=name:{}", "a".repeat(200));
    assert_eq!(get(&router, &ok).await.status(), StatusCode::OK);

    let too_long = format!("/layers/7/features?filter=name:{}", "a".repeat(201));
    let response = get(&router, &too_long).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_filter");
}

#[tokio::test]
async fn test_invalid_bbox_is_400() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    for bbox in ["1,2,3", "3,0,1,1", "a,b,c,d"] {
        let response = get(&router, &format!("/layers/7/features?bbox={bbox}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{bbox}");
        assert_eq!(body_json(response).await["error"], "invalid_bbox");
    }
    assert!(store.last_query().is_none());
}

#[tokio::test]
async fn test_invalid_limit_and_layer_id_are_400() {
    let store = Arc::new(MockSpatialStore::new(1));
    let router = feature_router(&store);

    let response = get(&router, "/layers/7/features?limit=ten").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_parameter");

    let response = get(&router, "/layers/seven/features").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_parameter");
}

#[tokio::test]
async fn test_feature_query_failure_is_500() {
    let store = Arc::new(MockSpatialStore::new(1));
    store.fail_with(QueryError::Failed("relation does not exist".to_string()));
    let router = feature_router(&store);

    let response = get(&router, "/layers/7/features?filter=species:oak").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "query_failed");
}

// =============================================================================
// Layer Catalogue
// =============================================================================

#[tokio::test]
async fn test_list_layers() {
    let store = Arc::new(
        MockSpatialStore::new(1)
            .with_layers(vec![sample_layer(1, "Roads"), sample_layer(7, "Trees")]),
    );
    let router = feature_router(&store);

    let response = get(&router, "/layers").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let layers = body.as_array().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[1]["id"], 7);
    assert_eq!(layers[1]["name"], "Trees");
    assert_eq!(layers[1]["version"], 1_700_000_000u64);
}

#[tokio::test]
async fn test_get_layer() {
    let store = Arc::new(MockSpatialStore::new(1).with_layers(vec![sample_layer(7, "Trees")]));
    let router = feature_router(&store);

    let response = get(&router, "/layers/7").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["public_id"], "layer-7");

    let response = get(&router, "/layers/8").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not_found");
}
