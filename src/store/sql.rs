//! SQL text for the PostGIS store.
//!
//! Every client-supplied value reaches the database as a bound parameter.
//! The only dynamic part of any query text is the number of `$n`
//! placeholders, which depends on how many filters and whether a bbox were
//! given, never on their contents.

use std::fmt::Write as _;

use super::BoundingBox;
use crate::feature::FilterPredicate;

/// Version stamp of a layer in epoch seconds (`$1` = layer id).
pub const LAYER_VERSION_SQL: &str = "\
SELECT COALESCE(EXTRACT(EPOCH FROM l.updated_at), 0)::bigint AS version
FROM layers l
WHERE l.id = $1::bigint";

/// Vector tile of one layer (`$1` = layer id, `$2..$4` = z, x, y).
///
/// Geometries are read from the pre-projected `geom_3857` column so they
/// share the coordinate system of `ST_TileEnvelope`. The attribute map is
/// a jsonb column, which `ST_AsMVT` expands into per-feature attributes.
pub const TILE_SQL: &str = "\
WITH bounds AS (
    SELECT ST_TileEnvelope($2::int, $3::int, $4::int) AS geom
),
tile AS (
    SELECT
        f.id,
        COALESCE(f.properties, '{}'::jsonb) AS properties,
        ST_AsMVTGeom(f.geom_3857, bounds.geom, 4096, 64, true) AS geom
    FROM features f, bounds
    WHERE f.layer_id = $1::bigint
      AND f.geom_3857 && bounds.geom
)
SELECT ST_AsMVT(tile, 'layer', 4096, 'geom', 'id') FROM tile";

/// Head of the feature query; [`FeatureQuery::to_sql`] appends the predicates.
pub const FEATURES_BASE_SQL: &str = "\
SELECT
    f.id::bigint AS id,
    COALESCE(f.properties, '{}'::jsonb) AS properties,
    ST_AsGeoJSON(f.geom)::jsonb AS geometry
FROM features f
WHERE f.layer_id = $1::bigint";

/// Layer catalogue; [`layers_sql`] adds the optional id restriction.
const LAYERS_BASE_SQL: &str = "\
SELECT
    l.id::bigint AS id,
    l.public_id::text AS public_id,
    l.name,
    l.description,
    l.owner_id::bigint AS owner_id,
    CASE WHEN l.bbox IS NOT NULL THEN ST_AsGeoJSON(l.bbox)::jsonb END AS bbox,
    to_char(l.updated_at AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"') AS updated_at,
    COALESCE(EXTRACT(EPOCH FROM l.updated_at), 0)::bigint AS version
FROM layers l";

/// Catalogue query, for all layers or for the one bound to `$1`.
pub fn layers_sql(single: bool) -> String {
    if single {
        format!("{LAYERS_BASE_SQL}\nWHERE l.id = $1::bigint")
    } else {
        format!("{LAYERS_BASE_SQL}\nORDER BY l.id")
    }
}

/// A value bound to a query placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    BigInt(i64),
    Double(f64),
    Text(String),
}

/// Filtered feature fetch for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQuery {
    pub layer_id: i64,

    /// Exact-match conditions on string-coerced attribute values, all required
    pub predicates: Vec<FilterPredicate>,

    /// Restrict to features intersecting this box
    pub bbox: Option<BoundingBox>,

    pub limit: u32,
}

impl FeatureQuery {
    pub fn new(layer_id: i64, predicates: Vec<FilterPredicate>, limit: u32) -> Self {
        Self {
            layer_id,
            predicates,
            bbox: None,
            limit,
        }
    }

    pub fn with_bbox(mut self, bbox: Option<BoundingBox>) -> Self {
        self.bbox = bbox;
        self
    }

    /// Compile into query text and its bound parameters.
    ///
    /// Keys and values are compared with `->>`, which coerces the stored
    /// attribute to text, so `{"year": 2020}` matches the filter `year:2020`.
    pub fn to_sql(&self) -> (String, Vec<SqlParam>) {
        let mut sql = String::from(FEATURES_BASE_SQL);
        let mut params = vec![SqlParam::BigInt(self.layer_id)];

        if let Some(bbox) = self.bbox {
            let first = params.len() + 1;
            let _ = write!(
                sql,
                "\n  AND f.geom && ST_MakeEnvelope(${}::float8, ${}::float8, ${}::float8, ${}::float8, 4326)",
                first,
                first + 1,
                first + 2,
                first + 3
            );
            params.extend([
                SqlParam::Double(bbox.xmin),
                SqlParam::Double(bbox.ymin),
                SqlParam::Double(bbox.xmax),
                SqlParam::Double(bbox.ymax),
            ]);
        }

        for predicate in &self.predicates {
            let key_index = params.len() + 1;
            let _ = write!(
                sql,
                "\n  AND (f.properties ->> ${}::text) = ${}::text",
                key_index,
                key_index + 1
            );
            params.push(SqlParam::Text(predicate.key.clone()));
            params.push(SqlParam::Text(predicate.value.clone()));
        }

        let _ = write!(sql, "\nORDER BY f.id\nLIMIT ${}::bigint", params.len() + 1);
        params.push(SqlParam::BigInt(i64::from(self.limit)));

        (sql, params)
    }
}
