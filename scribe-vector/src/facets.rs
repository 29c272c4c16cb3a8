//! Faceted aggregation over payload fields.
//!
//! All operations traverse the collection through fixed-size scroll pages,
//! carrying the backend's continuation cursor forward and stopping at a
//! fixed page cap so worst-case cost stays bounded on very large
//! collections. A collection that has not been provisioned yet yields the
//! empty result; every other failure propagates.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::backend::{ScrollRequest, VectorBackend};
use crate::error::{Result, VectorError};
use crate::filter::Filter;

/// Points fetched per scroll page.
pub const SCROLL_PAGE_SIZE: usize = 256;

/// Maximum scroll pages per traversal; bounds aggregate cost at
/// `SCROLL_PAGE_SIZE * MAX_SCROLL_PAGES` points visited.
pub const MAX_SCROLL_PAGES: usize = 40;

/// One facet bucket: a distinct value and how many points carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetCount {
    /// The distinct value, rendered as text.
    pub value: String,
    /// Number of points carrying the value.
    pub count: u64,
}

/// Drive a bounded traversal, feeding each fetched point's field value(s)
/// to `visit`. `visit` returns `false` to stop early. Returns `Ok(false)`
/// when the collection does not exist.
pub(crate) async fn traverse_field<F>(
    backend: &dyn VectorBackend,
    collection: &str,
    field: &str,
    filter: Option<Filter>,
    mut visit: F,
) -> Result<bool>
where
    F: FnMut(&Value) -> bool,
{
    let mut request = ScrollRequest {
        filter,
        limit: SCROLL_PAGE_SIZE,
        offset: None,
        fields: Some(vec![field.to_string()]),
    };

    for page_index in 0..MAX_SCROLL_PAGES {
        let page = match backend.scroll(collection, &request).await {
            Ok(page) => page,
            Err(VectorError::CollectionNotFound { .. }) => {
                debug!(collection, "facet traversal over missing collection");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        for point in &page.points {
            match point.payload.get(field) {
                // Array-valued fields contribute each element.
                Some(Value::Array(items)) => {
                    for item in items {
                        if !visit(item) {
                            return Ok(true);
                        }
                    }
                }
                Some(value) => {
                    if !visit(value) {
                        return Ok(true);
                    }
                }
                None => {}
            }
        }

        match page.next_offset {
            Some(next) => request.offset = Some(next),
            None => return Ok(true),
        }
        if page_index + 1 == MAX_SCROLL_PAGES {
            debug!(collection, field, pages = MAX_SCROLL_PAGES, "facet traversal hit page cap");
        }
    }
    Ok(true)
}

/// Distinct values of a payload field, up to `max_values`.
///
/// Array-valued fields are flattened before uniquing. Stops early once
/// `max_values` distinct values are collected or the page cap is hit, so an
/// arbitrarily large collection is never exhausted.
pub async fn unique_values(
    backend: &dyn VectorBackend,
    collection: &str,
    field: &str,
    max_values: usize,
) -> Result<Vec<Value>> {
    // Keyed by canonical JSON so 1 and "1" stay distinct; values keep their
    // first-seen form.
    let mut seen: BTreeMap<String, Value> = BTreeMap::new();
    traverse_field(backend, collection, field, None, |value| {
        if seen.len() >= max_values {
            return false;
        }
        seen.entry(value.to_string()).or_insert_with(|| value.clone());
        seen.len() < max_values
    })
    .await?;
    Ok(seen.into_values().collect())
}

/// Per-value counts of a payload field, sorted descending by count and
/// truncated to `max_values`.
///
/// An optional `base_filter` scopes the traversal (e.g. counts within one
/// tenant). Unlike [`unique_values`], every traversed point contributes, so
/// the traversal runs to the page cap; only the returned list is truncated.
pub async fn value_counts(
    backend: &dyn VectorBackend,
    collection: &str,
    field: &str,
    max_values: usize,
    base_filter: Option<Filter>,
) -> Result<Vec<FacetCount>> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    traverse_field(backend, collection, field, base_filter, |value| {
        let key = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
        true
    })
    .await?;

    let mut buckets: Vec<FacetCount> =
        counts.into_iter().map(|(value, count)| FacetCount { value, count }).collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    buckets.truncate(max_values);
    Ok(buckets)
}

/// Running (min, max) over a string-comparable date field.
///
/// RFC 3339 timestamps compare correctly as strings. Returns `None` when
/// the collection is missing or carries no values for the field.
pub async fn date_range(
    backend: &dyn VectorBackend,
    collection: &str,
    field: &str,
) -> Result<Option<(String, String)>> {
    let mut extent: Option<(String, String)> = None;
    traverse_field(backend, collection, field, None, |value| {
        if let Some(text) = value.as_str() {
            if let Some((min, max)) = &mut extent {
                if text < min.as_str() {
                    *min = text.to_string();
                }
                if text > max.as_str() {
                    *max = text.to_string();
                }
            } else {
                extent = Some((text.to_string(), text.to_string()));
            }
        }
        true
    })
    .await?;
    Ok(extent)
}
