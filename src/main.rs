//! Layer Tiles - vector tiles and features for PostGIS layers.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layer_tiles::{
    cache::{CacheBackend, MemoryStore, RedisStore},
    config::{CheckConfig, Cli, Command, ServeConfig, SignConfig, SignOutputFormat},
    feature::FeatureService,
    server::{auth::SignedUrlAuth, create_router, signed_query, RouterConfig},
    store::{PostgisStore, SpatialStore},
    tile::{TileService, VersionResolver},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Sign(config) => run_sign(config),
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Layer Tiles v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");

    if config.auth_enabled {
        info!("  Auth: enabled");
    } else {
        warn!("  Auth: DISABLED - all endpoints are publicly accessible");
        warn!("        Enable for production: --auth-enabled=true --auth-secret=<secret>");
    }

    info!(
        "  TTL: tiles {}s, layer versions {}s",
        config.tile_ttl, config.version_ttl
    );
    info!(
        "  Timeouts: query {}ms, cache {}ms",
        config.query_timeout_ms, config.cache_timeout_ms
    );
    info!("  Feature limit: {}", config.feature_limit);

    info!("Connecting to PostGIS...");
    let store = match connect_store(&config.database_url, config.db_pool_size).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("  Failed to connect to PostGIS: {}", e);
            error!("  Please check the database URL and that the server is reachable");
            return ExitCode::FAILURE;
        }
    };
    info!("  Connected successfully");

    if config.redis_url.is_some() {
        info!("Connecting to Redis...");
    } else {
        info!(
            "  In-process cache: {}MB",
            config.memory_cache_size / (1024 * 1024)
        );
    }
    let cache = Arc::new(
        CacheBackend::connect(
            config.redis_url.as_deref(),
            config.memory_cache_size,
            config.redis_connect_timeout(),
        )
        .await,
    );
    info!("  Cache: {}", cache.name());

    let tile_service = TileService::with_config(
        Arc::clone(&store),
        Arc::clone(&cache),
        config.tile_service_config(),
    );
    let feature_service = FeatureService::new(store)
        .with_query_timeout(config.query_timeout())
        .with_max_limit(config.feature_limit);

    let router = create_router(tile_service, feature_service, build_router_config(&config));

    let addr = config.bind_address();
    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    if !config.auth_enabled {
        info!("  curl http://{}/layers", addr);
    }

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn connect_store(database_url: &str, pool_size: usize) -> Result<PostgisStore, String> {
    let store = PostgisStore::connect(database_url, pool_size).map_err(|e| e.to_string())?;
    store.ping().await.map_err(|e| e.to_string())?;
    Ok(store)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "layer_tiles=debug,tower_http=debug"
    } else {
        "layer_tiles=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.auth_secret_or_empty())
    } else {
        RouterConfig::without_auth()
    };

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let params = match config.parse_params() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let auth = SignedUrlAuth::new(&config.secret);
    let ttl = Duration::from_secs(config.ttl);

    let params_ref: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let (signature, expiry) = auth.sign_with_params(&config.path, ttl, &params_ref);
    let query = signed_query(&params_ref, expiry, &signature);
    let url = config
        .base_url
        .as_deref()
        .map(|base_url| format!("{}{}?{}", base_url.trim_end_matches('/'), config.path, query));

    match config.format {
        SignOutputFormat::Signature => {
            println!("{}", signature);
        }
        SignOutputFormat::Json => {
            let json = serde_json::json!({
                "signature": signature,
                "expiry": expiry,
                "path": config.path,
                "ttl": config.ttl,
                "url": url,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        SignOutputFormat::Url => match url {
            Some(url) => println!("{}", url),
            None => {
                println!("{}?{}", config.path, query);
                eprintln!();
                eprintln!("Tip: Use --base-url to generate a complete URL");
            }
        },
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Layer Tiles Configuration Check");
    println!("═══════════════════════════════");
    println!();

    print!("Testing PostGIS connection... ");
    let store = match connect_store(&config.database_url, 1).await {
        Ok(store) => {
            println!("✓ success");
            store
        }
        Err(e) => {
            println!("✗ failed");
            println!();
            println!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref url) = config.redis_url {
        print!("Testing Redis connection... ");
        let timeout = Duration::from_millis(config.redis_connect_timeout_ms);
        match RedisStore::connect_within(url, timeout).await {
            Ok(_) => println!("✓ success"),
            Err(e) => {
                println!("✗ failed");
                println!();
                println!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if config.list_layers {
        println!();
        println!("Layers:");
        println!("───────");

        match store.list_layers().await {
            Ok(layers) if layers.is_empty() => println!("  (no layers found)"),
            Ok(layers) => {
                for layer in &layers {
                    println!("  {:>6}  {}", layer.id, layer.name);
                }
                println!();
                println!("Total: {} layer(s)", layers.len());
            }
            Err(e) => println!("  Error listing layers: {}", e),
        }
    }

    if let Some(layer_id) = config.test_layer {
        println!();
        print!("Resolving version of layer {}... ", layer_id);

        let resolver = VersionResolver::new(Arc::new(store), Arc::new(MemoryStore::new()));
        match resolver.resolve(layer_id).await {
            Ok(0) => {
                println!("✗ not found or never updated");
                return ExitCode::FAILURE;
            }
            Ok(version) => println!("✓ version {}", version),
            Err(e) => {
                println!("✗ failed");
                println!();
                println!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("═══════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
