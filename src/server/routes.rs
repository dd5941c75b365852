//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                                        - Health check (public)
//! /tiles/layer/{layer_id}/{z}/{x}/{y}.mvt        - Vector tile (protected)
//! /layers                                        - Layer catalogue (protected)
//! /layers/{layer_id}                             - Single layer (protected)
//! /layers/{layer_id}/features                    - Filtered features (protected)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use layer_tiles::cache::MemoryStore;
//! use layer_tiles::feature::FeatureService;
//! use layer_tiles::server::{create_router, RouterConfig};
//! use layer_tiles::store::PostgisStore;
//! use layer_tiles::tile::TileService;
//!
//! let store = Arc::new(PostgisStore::connect("postgres://tiles@localhost/gis", 16)?);
//! let cache = Arc::new(MemoryStore::new());
//!
//! let router = create_router(
//!     TileService::new(Arc::clone(&store), cache),
//!     FeatureService::new(store),
//!     RouterConfig::new("my-secret-key"),
//! );
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{middleware, routing::get, Router};
use http::header::{AUTHORIZATION, CONTENT_TYPE, IF_NONE_MATCH};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, SignedUrlAuth};
use super::handlers::{
    features_handler, health_handler, layer_handler, layers_handler, tile_handler, AppState,
};
use crate::cache::CacheStore;
use crate::feature::FeatureService;
use crate::store::SpatialStore;
use crate::tile::TileService;

/// Tile route; `{filename}` captures both `{y}` and `{y}.mvt`.
const TILE_ROUTE: &str = "/tiles/layer/{layer_id}/{z}/{x}/{filename}";

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Secret key for signed URL authentication
    pub auth_secret: String,

    /// Whether authentication is enabled
    pub auth_enabled: bool,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Authentication enabled, any CORS origin, tracing on.
    pub fn new(auth_secret: impl Into<String>) -> Self {
        Self {
            auth_secret: auth_secret.into(),
            auth_enabled: true,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Configuration with authentication disabled.
    ///
    /// **Warning**: This should only be used for development/testing.
    pub fn without_auth() -> Self {
        Self {
            auth_secret: String::new(),
            auth_enabled: false,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Restrict CORS to `origins`. An empty list disallows cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// `/health` is always public. Every other route goes through the signed URL
/// middleware when authentication is enabled.
pub fn create_router<S, C>(
    tile_service: TileService<S, C>,
    feature_service: FeatureService<S>,
    config: RouterConfig,
) -> Router
where
    S: SpatialStore + 'static,
    C: CacheStore + 'static,
{
    let app_state = AppState::new(tile_service, feature_service);

    let api_routes = Router::new()
        .route(TILE_ROUTE, get(tile_handler::<S, C>))
        .route("/layers", get(layers_handler::<S, C>))
        .route("/layers/{layer_id}", get(layer_handler::<S, C>))
        .route("/layers/{layer_id}/features", get(features_handler::<S, C>))
        .with_state(app_state);

    let api_routes = if config.auth_enabled {
        let auth = SignedUrlAuth::new(&config.auth_secret);
        api_routes.route_layer(middleware::from_fn_with_state(auth, auth_middleware))
    } else {
        api_routes
    };

    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(api_routes)
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, IF_NONE_MATCH])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed)
        }
    }
}
