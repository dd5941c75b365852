//! Feature collections and the layer catalogue.
//!
//! Unlike tiles, feature queries are never cached: every request goes to the
//! storage engine with its own filter set.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::error::{FeatureError, QueryError};
use crate::store::{
    bounded, BoundingBox, FeatureQuery, FeatureRow, Layer, SpatialStore, DEFAULT_FEATURE_LIMIT,
    DEFAULT_QUERY_TIMEOUT,
};

use super::filter::build_predicates;

// =============================================================================
// GeoJSON Output
// =============================================================================

/// A GeoJSON `Feature`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,

    pub id: i64,

    pub geometry: serde_json::Value,

    pub properties: serde_json::Value,
}

impl From<FeatureRow> for Feature {
    fn from(row: FeatureRow) -> Self {
        let properties = match row.properties {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        Self {
            kind: "Feature",
            id: row.id,
            geometry: row.geometry,
            properties,
        }
    }
}

/// A GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,

    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection",
            features,
        }
    }
}

// =============================================================================
// Feature Request
// =============================================================================

/// Parameters of a feature collection request, as received.
#[derive(Debug, Clone, Default)]
pub struct FeatureRequest {
    pub layer_id: i64,

    /// Raw `key:value` filter strings
    pub filters: Vec<String>,

    /// Raw `xmin,ymin,xmax,ymax`
    pub bbox: Option<String>,

    pub limit: Option<u32>,
}

// =============================================================================
// Feature Service
// =============================================================================

/// Serves filtered feature collections and layer metadata.
pub struct FeatureService<S: SpatialStore> {
    store: Arc<S>,
    query_timeout: Duration,
    max_limit: u32,
}

impl<S: SpatialStore> FeatureService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_limit: DEFAULT_FEATURE_LIMIT,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Upper bound (and default) for the number of returned features.
    pub fn with_max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    /// Validate the request, run the filtered query and build the collection.
    ///
    /// No match is an empty collection, not an error.
    pub async fn get_features(
        &self,
        request: FeatureRequest,
    ) -> Result<FeatureCollection, FeatureError> {
        let predicates = build_predicates(&request.filters)?;

        let bbox = match request.bbox {
            Some(raw) => Some(
                BoundingBox::parse(&raw).ok_or(FeatureError::InvalidBbox { bbox: raw })?,
            ),
            None => None,
        };

        let limit = request
            .limit
            .unwrap_or(self.max_limit)
            .clamp(1, self.max_limit);

        let query = FeatureQuery::new(request.layer_id, predicates, limit).with_bbox(bbox);
        let rows = bounded(self.query_timeout, self.store.query_features(&query)).await?;

        debug!(
            layer_id = request.layer_id,
            filters = query.predicates.len(),
            features = rows.len(),
            "Feature query complete"
        );

        Ok(FeatureCollection::new(
            rows.into_iter().map(Feature::from).collect(),
        ))
    }

    pub async fn list_layers(&self) -> Result<Vec<Layer>, QueryError> {
        bounded(self.query_timeout, self.store.list_layers()).await
    }

    pub async fn get_layer(&self, layer_id: i64) -> Result<Layer, FeatureError> {
        bounded(self.query_timeout, self.store.get_layer(layer_id))
            .await?
            .ok_or(FeatureError::LayerNotFound { layer_id })
    }
}
