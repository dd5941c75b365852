//! Filtered feature queries.
//!
//! - [`build_predicates`]: validates `key:value` filter strings
//! - [`FeatureService`]: runs the parameterized query and builds GeoJSON

mod filter;
mod service;

pub use filter::{
    build_predicates, FilterPredicate, FILTER_DELIMITER, MAX_FILTERS, MAX_FILTER_VALUE_LEN,
};
pub use service::{Feature, FeatureCollection, FeatureRequest, FeatureService};
