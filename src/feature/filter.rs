//! Attribute filters of the form `key:value`.
//!
//! Attribute keys differ per layer and are unknown at compile time, so the
//! predicate list is built at request time. Keys and values are
//! attacker-controlled; they only ever travel as bound query parameters
//! (see [`FeatureQuery::to_sql`](crate::store::FeatureQuery::to_sql)).

use serde::Serialize;

use crate::error::FilterError;

/// Maximum number of filters per request.
pub const MAX_FILTERS: usize = 20;

/// Maximum length of a filter value, in characters.
pub const MAX_FILTER_VALUE_LEN: usize = 200;

/// Separator between key and value.
pub const FILTER_DELIMITER: char = ':';

/// Exact-match condition on one attribute, compared as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterPredicate {
    pub key: String,
    pub value: String,
}

impl FilterPredicate {
    /// Parse a single `key:value` entry.
    ///
    /// Splits on the first delimiter only, so `note:a:b` has value `a:b`.
    pub fn parse(filter: &str) -> Result<Self, FilterError> {
        let (key, value) = filter
            .split_once(FILTER_DELIMITER)
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| FilterError::MalformedFilter {
                filter: filter.to_string(),
            })?;

        let length = value.chars().count();
        if length > MAX_FILTER_VALUE_LEN {
            return Err(FilterError::FilterValueTooLong {
                filter: filter.to_string(),
                length,
                max: MAX_FILTER_VALUE_LEN,
            });
        }

        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Validate raw filter strings and turn them into predicates, in order.
///
/// Duplicates are kept. The count bound is checked before any entry is
/// parsed; after that the first invalid entry fails the whole list.
pub fn build_predicates<S: AsRef<str>>(raw: &[S]) -> Result<Vec<FilterPredicate>, FilterError> {
    if raw.len() > MAX_FILTERS {
        return Err(FilterError::TooManyFilters {
            count: raw.len(),
            max: MAX_FILTERS,
        });
    }

    raw.iter()
        .map(|filter| FilterPredicate::parse(filter.as_ref()))
        .collect()
}
