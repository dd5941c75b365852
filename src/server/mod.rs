//! HTTP server layer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   GET /tiles/layer/{id}/{z}/{x}/{y}.mvt   GET /layers/...       │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │ (signed URL)│  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{auth_middleware, signed_query, AuthError, SignedUrlAuth};
pub use handlers::{
    etag_matches, features_handler, health_handler, layer_handler, layers_handler,
    parse_feature_query, tile_handler, AppState, ErrorResponse, HealthResponse, TilePathParams,
    LAYER_VERSION_HEADER, TILE_CACHE_HIT_HEADER,
};
pub use routes::{create_router, RouterConfig};
