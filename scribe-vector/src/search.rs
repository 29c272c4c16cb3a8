//! Similarity search with composable scoping.

use tracing::{debug, error};

use crate::backend::{ScoredPoint, SearchRequest, VectorBackend};
use crate::error::{Result, VectorError};
use crate::filter::SearchScope;

/// Default minimum score: conservative enough to drop near-irrelevant
/// matches while keeping recall for browsing callers, who can pass `None`.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;

/// Default result limit.
pub const DEFAULT_LIMIT: usize = 10;

/// Floor for search-time exploration breadth.
const MIN_HNSW_EF: usize = 64;

/// Tuning knobs for one search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of hits.
    pub limit: usize,
    /// Minimum score for a hit; `None` disables the cutoff for
    /// recall-oriented browsing.
    pub score_threshold: Option<f32>,
    /// Explicit search-time exploration breadth. When unset, `ef` scales
    /// with the requested limit, trading latency for recall on larger
    /// requests.
    pub hnsw_ef: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT, score_threshold: Some(DEFAULT_SCORE_THRESHOLD), hnsw_ef: None }
    }
}

impl SearchOptions {
    /// Options returning up to `limit` hits with the default threshold.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit, ..Self::default() }
    }

    /// The exploration breadth actually sent: the override, or 4× the
    /// requested limit with a floor of 64.
    pub fn effective_ef(&self) -> usize {
        self.hnsw_ef.unwrap_or_else(|| (self.limit * 4).max(MIN_HNSW_EF))
    }
}

/// Ranked similarity search over one collection.
///
/// The scope's predicates compose into a single conjunction; an empty scope
/// sends no filter at all. Every failure is wrapped with the collection and
/// a compact filter description and re-raised; a search is something a
/// human is waiting on, so nothing is swallowed. A missing collection is a
/// hard error here, unlike for the aggregate reads.
pub async fn search(
    backend: &dyn VectorBackend,
    collection: &str,
    vector: Vec<f32>,
    scope: &SearchScope,
    options: &SearchOptions,
) -> Result<Vec<ScoredPoint>> {
    let filter = scope.to_filter();
    let filter_text = filter.as_ref().map(|f| f.describe()).unwrap_or_else(|| "none".into());
    let request = SearchRequest {
        vector,
        filter,
        limit: options.limit,
        score_threshold: options.score_threshold,
        hnsw_ef: Some(options.effective_ef()),
    };

    match backend.search(collection, &request).await {
        Ok(hits) => {
            debug!(collection, hits = hits.len(), filter = %filter_text, "search completed");
            Ok(hits)
        }
        Err(VectorError::Backend { operation, message }) => {
            error!(collection, filter = %filter_text, error = %message, "search failed");
            Err(VectorError::Backend {
                operation: format!("{operation} (filter: {filter_text})"),
                message,
            })
        }
        Err(err) => {
            error!(collection, filter = %filter_text, error = %err, "search failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ef_scales_with_limit_when_not_overridden() {
        assert_eq!(SearchOptions::with_limit(10).effective_ef(), 64);
        assert_eq!(SearchOptions::with_limit(50).effective_ef(), 200);
    }

    #[test]
    fn explicit_ef_override_wins() {
        let options = SearchOptions { hnsw_ef: Some(32), ..SearchOptions::with_limit(100) };
        assert_eq!(options.effective_ef(), 32);
    }

    #[test]
    fn defaults_are_conservative() {
        let options = SearchOptions::default();
        assert_eq!(options.limit, DEFAULT_LIMIT);
        assert_eq!(options.score_threshold, Some(DEFAULT_SCORE_THRESHOLD));
    }
}
