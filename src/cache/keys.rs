//! Cache key scheme.
//!
//! Keys are plain delimited strings so operators can inspect them and flush
//! by prefix (e.g. `redis-cli --scan --pattern 'tile:7:*'`):
//!
//! ```text
//! tile:{layer_id}:v{version}:{z}:{x}:{y}     tile payloads (long TTL)
//! layer_version:{layer_id}                   version stamps (short TTL)
//! ```
//!
//! Every field is an integer, so the `:` delimiter can never appear inside a
//! field and distinct tuples always produce distinct keys.

use crate::store::TileCoord;

/// Delimiter between key fields.
pub const KEY_DELIMITER: char = ':';

/// Prefix of every tile payload key.
pub const TILE_KEY_PREFIX: &str = "tile";

/// Prefix of every layer version key.
pub const VERSION_KEY_PREFIX: &str = "layer_version";

/// Build the cache key for a tile of `layer_id` at `version`.
///
/// ```
/// use layer_tiles::cache::tile_key;
/// use layer_tiles::store::TileCoord;
///
/// let key = tile_key(7, 1_700_000_000, TileCoord::new(3, 1, 2));
/// assert_eq!(key, "tile:7:v1700000000:3:1:2");
/// ```
pub fn tile_key(layer_id: i64, version: u64, coord: TileCoord) -> String {
    let d = KEY_DELIMITER;
    format!(
        "{TILE_KEY_PREFIX}{d}{layer_id}{d}v{version}{d}{}{d}{}{d}{}",
        coord.z, coord.x, coord.y
    )
}

/// Prefix shared by all tile keys of a layer, across versions.
pub fn tile_key_prefix(layer_id: i64) -> String {
    format!("{TILE_KEY_PREFIX}{KEY_DELIMITER}{layer_id}{KEY_DELIMITER}")
}

/// Build the cache key holding the version stamp of `layer_id`.
pub fn version_key(layer_id: i64) -> String {
    format!("{VERSION_KEY_PREFIX}{KEY_DELIMITER}{layer_id}")
}
