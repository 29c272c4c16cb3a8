//! Re-crawl deduplication and data lifecycle.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::backend::{ScrollRequest, VectorBackend};
use crate::error::{Result, VectorError};
use crate::facets::{MAX_SCROLL_PAGES, SCROLL_PAGE_SIZE};
use crate::filter::Filter;

/// One known source: its URL and the content hash recorded at index time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstChunkRecord {
    /// The source URL.
    pub url: String,
    /// Hex SHA-256 of the first chunk's text, when recorded.
    pub content_hash: Option<String>,
}

/// Per-collection outcome of a multi-collection delete.
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Collections whose delete committed.
    pub succeeded: Vec<String>,
    /// Collections whose delete failed, with the failure.
    pub failed: Vec<(String, VectorError)>,
}

impl DeleteReport {
    /// Whether every collection's delete committed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// List the indexed sources of a collection for re-crawl dedup.
///
/// Traverses the collection fetching only the chunk-index, URL, and
/// content-hash payload fields, and keeps one record per URL taken from the
/// point whose chunk index is exactly zero, the convention marking "the
/// start of a document". That keeps the listing at one record per source
/// instead of one per chunk. A source whose chunk 0 never indexed is
/// invisible here; that edge is inherent to the convention.
///
/// A missing collection yields an empty list. The traversal shares the
/// facet page bounds, so it is self-limiting on very large collections.
pub async fn first_chunk_index(
    backend: &dyn VectorBackend,
    collection: &str,
    url_field: &str,
) -> Result<Vec<FirstChunkRecord>> {
    let mut records: BTreeMap<String, FirstChunkRecord> = BTreeMap::new();
    let mut request = ScrollRequest {
        filter: None,
        limit: SCROLL_PAGE_SIZE,
        offset: None,
        fields: Some(vec![
            url_field.to_string(),
            "chunk_index".to_string(),
            "content_hash".to_string(),
        ]),
    };

    for _ in 0..MAX_SCROLL_PAGES {
        let page = match backend.scroll(collection, &request).await {
            Ok(page) => page,
            Err(VectorError::CollectionNotFound { .. }) => {
                debug!(collection, "dedup listing over missing collection");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        for point in &page.points {
            if point.payload.get("chunk_index").and_then(Value::as_u64) != Some(0) {
                continue;
            }
            let Some(url) = point.payload.get(url_field).and_then(Value::as_str) else {
                continue;
            };
            let content_hash = point
                .payload
                .get("content_hash")
                .and_then(Value::as_str)
                .map(str::to_string);
            records
                .entry(url.to_string())
                .or_insert_with(|| FirstChunkRecord { url: url.to_string(), content_hash });
        }

        match page.next_offset {
            Some(next) => request.offset = Some(next),
            None => break,
        }
    }

    debug!(collection, sources = records.len(), "built dedup listing");
    Ok(records.into_values().collect())
}

/// Delete all points whose `field` equals `value`.
///
/// Used to remove one source URL before re-indexing, or one document on
/// user deletion.
pub async fn delete_by_field(
    backend: &dyn VectorBackend,
    collection: &str,
    field: &str,
    value: impl Into<Value>,
) -> Result<()> {
    let filter = Filter::field_equals(field, value);
    backend.delete_by_filter(collection, &filter).await?;
    debug!(collection, field, "deleted points by field equality");
    Ok(())
}

/// Delete one user's points across several collections.
///
/// Partial success is reported per collection rather than failing
/// all-or-nothing: account-deletion callers must see which collections
/// still hold data so they can retry or alert.
pub async fn delete_user_data(
    backend: &dyn VectorBackend,
    collections: &[&str],
    user_id: &str,
) -> DeleteReport {
    let mut report = DeleteReport::default();
    for collection in collections {
        match delete_by_field(backend, collection, "user_id", user_id).await {
            Ok(()) => report.succeeded.push(collection.to_string()),
            // A collection that was never provisioned holds no user data.
            Err(VectorError::CollectionNotFound { .. }) => {
                report.succeeded.push(collection.to_string());
            }
            Err(err) => {
                error!(collection, error = %err, "user-data delete failed");
                report.failed.push((collection.to_string(), err));
            }
        }
    }
    if !report.is_complete() {
        warn!(
            failed = report.failed.len(),
            succeeded = report.succeeded.len(),
            "user-data delete completed partially"
        );
    }
    report
}
