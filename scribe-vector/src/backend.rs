//! The wire-operation seam between the access layer and a vector backend.
//!
//! Every component above the connection manager (provisioning, search,
//! facets, dedup, sampling) is written against [`VectorBackend`], so the
//! whole layer runs unchanged over the REST backend
//! ([`QdrantBackend`](crate::qdrant::QdrantBackend)) or the in-memory one
//! ([`MemoryBackend`](crate::memory::MemoryBackend)) used in development
//! and tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::filter::Filter;
use crate::payload::PayloadMap;
use crate::schema::{CollectionSettings, FieldIndexKind};

/// One point to upsert: derived id, embedding vector, payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    /// Derived point id (see [`ids`](crate::ids)); never a raw string key.
    pub id: u64,
    /// Embedding vector; length must match the collection dimensionality.
    pub vector: Vec<f32>,
    /// Payload stored alongside the vector.
    pub payload: PayloadMap,
}

/// One ranked similarity-search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    /// Point id.
    pub id: u64,
    /// Similarity score; higher is more relevant.
    pub score: f32,
    /// Stored payload.
    pub payload: PayloadMap,
}

/// One point returned by a scroll traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPoint {
    /// Point id.
    pub id: u64,
    /// Stored payload, projected to the requested fields when a projection
    /// was given.
    pub payload: PayloadMap,
}

/// One page of a scroll traversal plus the continuation cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPage {
    /// The points in this page.
    pub points: Vec<RetrievedPoint>,
    /// Cursor for the next page; `None` when the traversal is exhausted.
    pub next_offset: Option<u64>,
}

/// A similarity-search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Optional payload filter; `None` sends no filter at all.
    pub filter: Option<Filter>,
    /// Maximum number of hits.
    pub limit: usize,
    /// Minimum score for a hit to be returned.
    pub score_threshold: Option<f32>,
    /// Search-time exploration breadth override.
    pub hnsw_ef: Option<usize>,
}

/// A scroll-traversal request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollRequest {
    /// Optional payload filter; `None` sends no filter at all.
    pub filter: Option<Filter>,
    /// Page size.
    pub limit: usize,
    /// Continuation cursor from the previous page.
    pub offset: Option<u64>,
    /// Payload fields to fetch; `None` fetches the full payload.
    pub fields: Option<Vec<String>>,
}

/// A storage backend holding named collections of vector points.
///
/// Implementations must be safe for concurrent use behind an `Arc` once
/// constructed; the access layer performs no locking around read calls.
#[async_trait]
pub trait VectorBackend: std::fmt::Debug + Send + Sync {
    /// List the names of all collections.
    ///
    /// Also serves as the cheap reachability probe for health checks.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Create a collection with the given settings.
    ///
    /// Fails with [`VectorError::AlreadyExists`](crate::error::VectorError)
    /// if the collection is already present.
    async fn create_collection(&self, name: &str, settings: &CollectionSettings) -> Result<()>;

    /// Create a payload index on a collection field.
    ///
    /// Fails with [`VectorError::AlreadyExists`](crate::error::VectorError)
    /// if an index of this kind already covers the field.
    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldIndexKind,
    ) -> Result<()>;

    /// Upsert points, waiting for the write to be committed.
    ///
    /// Point ids are derived (idempotent): re-upserting the same logical
    /// chunk overwrites the previous version.
    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()>;

    /// Delete all points matching the filter, waiting for the delete to be
    /// committed.
    async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<()>;

    /// Ranked similarity search.
    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>>;

    /// Cursor-based traversal over all points matching the filter.
    async fn scroll(&self, collection: &str, request: &ScrollRequest) -> Result<ScrollPage>;

    /// Count points matching the filter. `exact` trades latency for an
    /// exact total rather than an estimate.
    async fn count(&self, collection: &str, filter: Option<&Filter>, exact: bool) -> Result<u64>;
}
