use thiserror::Error;

/// Errors from the tile cache store (in-process LRU or Redis).
///
/// The tile path never fails a request because of these: a failed read is
/// treated as a miss and a failed write leaves the tile served but uncached.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Store unreachable or returned an error
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    /// Store did not answer within the cache timeout
    #[error("Cache store timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Errors from the spatial storage engine.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Connection could not be obtained or was lost
    #[error("Storage engine unavailable: {0}")]
    StoreUnavailable(String),

    /// The engine rejected or failed the query
    #[error("Query failed: {0}")]
    Failed(String),

    /// Query did not complete within the query timeout
    #[error("Query timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Client input errors raised while building attribute filters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// More filter entries than allowed per request
    #[error("Too many filters: got {count}, at most {max} allowed")]
    TooManyFilters { count: usize, max: usize },

    /// Entry has no `key:value` delimiter or an empty key
    #[error("Malformed filter '{filter}': expected key:value")]
    MalformedFilter { filter: String },

    /// Value part exceeds the length bound
    #[error("Filter value too long in '{filter}': {length} characters, at most {max} allowed")]
    FilterValueTooLong {
        filter: String,
        length: usize,
        max: usize,
    },
}

/// Errors that fail a tile request.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Version lookup or tile render failed in the storage engine
    #[error("{0}")]
    Query(#[from] QueryError),

    /// A path segment was not a valid coordinate
    #[error("Invalid tile coordinate '{value}'")]
    InvalidCoordinate { value: String },
}

/// Errors from the feature collection and layer endpoints.
#[derive(Debug, Clone, Error)]
pub enum FeatureError {
    #[error("{0}")]
    Filter(#[from] FilterError),

    /// `bbox` parameter is not four finite numbers with min < max
    #[error("Invalid bbox '{bbox}': expected xmin,ymin,xmax,ymax")]
    InvalidBbox { bbox: String },

    /// A path or query parameter is not a valid integer
    #[error("Invalid {name} '{value}'")]
    InvalidParameter { name: &'static str, value: String },

    #[error("Layer not found: {layer_id}")]
    LayerNotFound { layer_id: i64 },

    #[error("{0}")]
    Query(#[from] QueryError),
}
