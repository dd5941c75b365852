//! Configuration management.
//!
//! Command-line arguments via clap, each overridable by an environment
//! variable with the `TILES_` prefix.
//!
//! # Commands
//!
//! - `serve` - run the tile server
//! - `sign` - produce a signed URL for a path
//! - `check` - test storage and cache connectivity
//!
//! # Environment Variables
//!
//! - `TILES_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILES_PORT` - Server port (default: 3000)
//! - `TILES_DATABASE_URL` - PostGIS connection string (required)
//! - `TILES_DB_POOL_SIZE` - Pooled database connections (default: 16)
//! - `TILES_REDIS_URL` - Shared cache; in-process LRU when unset or unreachable
//! - `TILES_REDIS_CONNECT_TIMEOUT_MS` - Startup bound on reaching Redis (default: 2000)
//! - `TILES_MEMORY_CACHE_SIZE` - In-process cache bytes (default: 256MB)
//! - `TILES_TILE_TTL` - Tile TTL and `max-age` seconds (default: 86400)
//! - `TILES_VERSION_TTL` - Layer version TTL seconds (default: 3600)
//! - `TILES_QUERY_TIMEOUT_MS` - Storage engine timeout (default: 10000)
//! - `TILES_CACHE_TIMEOUT_MS` - Cache store timeout (default: 500)
//! - `TILES_CACHE_EMPTY_TILES` - Cache zero-length tiles (default: true)
//! - `TILES_FEATURE_LIMIT` - Max features per query (default: 5000)
//! - `TILES_AUTH_SECRET` - HMAC secret for signed URLs
//! - `TILES_AUTH_ENABLED` - Enable authentication (default: true)
//! - `TILES_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::cache::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MEMORY_CACHE_CAPACITY, DEFAULT_TILE_TTL, DEFAULT_VERSION_TTL,
};
use crate::store::{DEFAULT_FEATURE_LIMIT, DEFAULT_POOL_SIZE};
use crate::tile::TileServiceConfig;

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;

pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 500;

pub const DEFAULT_REDIS_CONNECT_TIMEOUT_MS: u64 = DEFAULT_CONNECT_TIMEOUT.as_millis() as u64;

/// Default validity of signed URLs (1 hour).
pub const DEFAULT_SIGN_TTL: u64 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Layer Tiles - vector tiles and filtered features from PostGIS layers.
#[derive(Parser, Debug, Clone)]
#[command(name = "layer-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the tile server
    Serve(ServeConfig),

    /// Generate a signed URL for a path
    Sign(SignConfig),

    /// Check database and cache connectivity
    Check(CheckConfig),
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILES_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILES_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage
    // =========================================================================
    /// PostgreSQL/PostGIS connection string.
    #[arg(long, env = "TILES_DATABASE_URL")]
    pub database_url: String,

    /// Maximum number of pooled database connections.
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE, env = "TILES_DB_POOL_SIZE")]
    pub db_pool_size: usize,

    /// Timeout for storage engine calls, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_MS, env = "TILES_QUERY_TIMEOUT_MS")]
    pub query_timeout_ms: u64,

    /// Maximum number of features returned by a feature query.
    #[arg(long, default_value_t = DEFAULT_FEATURE_LIMIT, env = "TILES_FEATURE_LIMIT")]
    pub feature_limit: u32,

    // =========================================================================
    // Cache
    // =========================================================================
    /// Redis URL for a cache shared between instances.
    ///
    /// If not specified, or not reachable at startup, tiles are cached in
    /// process.
    #[arg(long, env = "TILES_REDIS_URL")]
    pub redis_url: Option<String>,

    /// How long to wait for Redis at startup, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_REDIS_CONNECT_TIMEOUT_MS, env = "TILES_REDIS_CONNECT_TIMEOUT_MS")]
    pub redis_connect_timeout_ms: u64,

    /// Capacity of the in-process cache in bytes.
    #[arg(long, default_value_t = DEFAULT_MEMORY_CACHE_CAPACITY, env = "TILES_MEMORY_CACHE_SIZE")]
    pub memory_cache_size: usize,

    /// TTL of cached tiles in seconds, also sent as `max-age`.
    #[arg(long, default_value_t = DEFAULT_TILE_TTL.as_secs(), env = "TILES_TILE_TTL")]
    pub tile_ttl: u64,

    /// TTL of cached layer versions in seconds.
    ///
    /// Bounds how long stale tiles are served after a layer update.
    #[arg(long, default_value_t = DEFAULT_VERSION_TTL.as_secs(), env = "TILES_VERSION_TTL")]
    pub version_ttl: u64,

    /// Timeout for cache store calls, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_TIMEOUT_MS, env = "TILES_CACHE_TIMEOUT_MS")]
    pub cache_timeout_ms: u64,

    /// Cache zero-length tiles.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "TILES_CACHE_EMPTY_TILES")]
    pub cache_empty_tiles: bool,

    // =========================================================================
    // Authentication
    // =========================================================================
    /// Secret key for HMAC-SHA256 signed URL authentication.
    #[arg(long, env = "TILES_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    /// Enable signed URL authentication.
    ///
    /// WARNING: Only disable authentication in development/testing.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "TILES_AUTH_ENABLED")]
    pub auth_enabled: bool,

    // =========================================================================
    // CORS
    // =========================================================================
    /// Allowed CORS origins (comma-separated). Any origin when unset.
    #[arg(long, env = "TILES_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_enabled && self.auth_secret.as_deref().map_or(true, str::is_empty) {
            return Err(
                "Authentication is enabled but no secret provided. \
                 Set --auth-secret or TILES_AUTH_SECRET, or disable auth with --auth-enabled=false"
                    .to_string(),
            );
        }

        if self.database_url.trim().is_empty() {
            return Err(
                "Database URL is required. Set --database-url or TILES_DATABASE_URL".to_string(),
            );
        }

        if self.db_pool_size == 0 {
            return Err("db_pool_size must be greater than 0".to_string());
        }
        if self.memory_cache_size == 0 {
            return Err("memory_cache_size must be greater than 0".to_string());
        }
        if self.tile_ttl == 0 {
            return Err("tile_ttl must be greater than 0".to_string());
        }
        if self.query_timeout_ms == 0
            || self.cache_timeout_ms == 0
            || self.redis_connect_timeout_ms == 0
        {
            return Err("timeouts must be greater than 0".to_string());
        }
        if self.feature_limit == 0 {
            return Err("feature_limit must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }

    pub fn redis_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_connect_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn tile_service_config(&self) -> TileServiceConfig {
        TileServiceConfig {
            tile_ttl: Duration::from_secs(self.tile_ttl),
            version_ttl: Duration::from_secs(self.version_ttl),
            query_timeout: self.query_timeout(),
            cache_timeout: Duration::from_millis(self.cache_timeout_ms),
            cache_empty_tiles: self.cache_empty_tiles,
        }
    }
}

// =============================================================================
// Sign
// =============================================================================

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutputFormat {
    /// Path or full URL with `exp` and `sig`
    Url,

    /// Hex signature only
    Signature,

    /// JSON object with signature, expiry and URL
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    /// Path to sign, e.g. /tiles/layer/7/3/1/2.mvt
    #[arg(long)]
    pub path: String,

    /// Secret key shared with the server.
    #[arg(long, env = "TILES_AUTH_SECRET")]
    pub secret: String,

    /// Validity in seconds.
    #[arg(long, default_value_t = DEFAULT_SIGN_TTL)]
    pub ttl: u64,

    /// Base URL to prepend, e.g. https://tiles.example.com
    #[arg(long)]
    pub base_url: Option<String>,

    /// Extra query parameter as key=value (repeatable), e.g. filter=species:oak
    #[arg(short = 'P', long = "param")]
    pub params: Vec<String>,

    #[arg(long, value_enum, default_value_t = SignOutputFormat::Url)]
    pub format: SignOutputFormat,
}

impl SignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret is required. Set --secret or TILES_AUTH_SECRET".to_string());
        }
        if !self.path.starts_with('/') {
            return Err(format!("Path must start with '/': {}", self.path));
        }
        if self.ttl == 0 {
            return Err("ttl must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Split each `--param` on its first `=`.
    pub fn parse_params(&self) -> Result<Vec<(String, String)>, String> {
        self.params
            .iter()
            .map(|param| {
                param
                    .split_once('=')
                    .filter(|(key, _)| !key.is_empty())
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .ok_or_else(|| format!("Invalid parameter '{}': expected key=value", param))
            })
            .collect()
    }
}

// =============================================================================
// Check
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// PostgreSQL/PostGIS connection string.
    #[arg(long, env = "TILES_DATABASE_URL")]
    pub database_url: String,

    /// Redis URL to test, if a shared cache is used.
    #[arg(long, env = "TILES_REDIS_URL")]
    pub redis_url: Option<String>,

    /// How long to wait for Redis, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_REDIS_CONNECT_TIMEOUT_MS, env = "TILES_REDIS_CONNECT_TIMEOUT_MS")]
    pub redis_connect_timeout_ms: u64,

    /// List the layers in the catalogue.
    #[arg(long, default_value_t = false)]
    pub list_layers: bool,

    /// Resolve the current version of this layer.
    #[arg(long)]
    pub test_layer: Option<i64>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}
