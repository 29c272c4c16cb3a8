//! The vector-layer facade.
//!
//! [`VectorLayer`] is the surface the rest of the application talks to. It
//! composes the connection manager, the schema provisioner, and the query
//! components behind one object constructed at the composition root.
//!
//! # Example
//!
//! ```rust,ignore
//! use scribe_vector::{Payload, SearchScope, VectorConfig, VectorLayer};
//!
//! let config = VectorConfig::from_env()?;
//! let layer = VectorLayer::new(config, embedder.dimensions());
//! layer.init().await?;
//!
//! let chunks = vec![(embedding, Payload::web_content(url, 0, text, user_id))];
//! layer.index("web_content", url, chunks).await?;
//! let hits = layer
//!     .search("web_content", query_embedding, &SearchScope::new().user(user_id), &options)
//!     .await?;
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::backend::{PointRecord, ScoredPoint, VectorBackend};
use crate::config::VectorConfig;
use crate::connection::ConnectionManager;
use crate::dedup::{self, DeleteReport, FirstChunkRecord};
use crate::error::Result;
use crate::facets::{self, FacetCount};
use crate::filter::{Filter, SearchScope};
use crate::ids;
use crate::payload::{Payload, PayloadMap};
use crate::sample;
use crate::schema;
use crate::search::{self, SearchOptions};

/// The vector-store access layer.
///
/// One instance per process shares one live backend connection. First use
/// triggers the deferred connect and, once connected, schema provisioning;
/// every call consults the manager's throttled health state before
/// executing. When the backend is down, calls fail fast with a typed
/// `Unavailable` error so the rest of the application keeps running with
/// vector-dependent features disabled.
pub struct VectorLayer {
    manager: Arc<ConnectionManager>,
    vector_size: usize,
    provisioned: Mutex<bool>,
}

impl VectorLayer {
    /// Create a layer over the REST backend. Does not connect; the first
    /// operation (or an explicit [`init`](VectorLayer::init)) does.
    ///
    /// `vector_size` is the dimensionality of the active embedding model;
    /// collections are provisioned with it and it is fixed for their
    /// lifetime.
    pub fn new(config: VectorConfig, vector_size: usize) -> Self {
        Self::with_manager(Arc::new(ConnectionManager::new(config)), vector_size)
    }

    /// Create a layer over an existing connection manager (custom factory,
    /// shared manager, or tests).
    pub fn with_manager(manager: Arc<ConnectionManager>, vector_size: usize) -> Self {
        Self { manager, vector_size, provisioned: Mutex::new(false) }
    }

    /// The underlying connection manager.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Connect and provision eagerly instead of on first use.
    pub async fn init(&self) -> Result<()> {
        self.backend().await.map(|_| ())
    }

    /// Drop the backend connection.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }

    /// Reset a degraded layer and reconnect.
    pub async fn reinitialize(&self) -> Result<()> {
        self.manager.reinitialize().await.map(|_| ())
    }

    /// Whether the layer is currently connected.
    pub async fn is_available(&self) -> bool {
        self.manager.is_available().await
    }

    /// Fail fast unless the layer is (or can immediately become) available.
    pub async fn ensure_available(&self) -> Result<()> {
        self.manager.ensure_available().await
    }

    /// Acquire the live backend, provisioning the schema on first success.
    async fn backend(&self) -> Result<Arc<dyn VectorBackend>> {
        let backend = self.manager.acquire().await?;
        let mut provisioned = self.provisioned.lock().await;
        if !*provisioned {
            schema::provision_all(backend.as_ref(), self.vector_size).await?;
            *provisioned = true;
            info!(vector_size = self.vector_size, "vector collections provisioned");
        }
        Ok(backend)
    }

    /// Index one logical source's chunks.
    ///
    /// Point ids derive from the logical key and each chunk's index, so
    /// re-indexing the same source overwrites its previous chunks instead
    /// of duplicating them. Returns the number of points written.
    pub async fn index(
        &self,
        collection: &str,
        logical_key: &str,
        chunks: Vec<(Vec<f32>, Payload)>,
    ) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let backend = self.backend().await?;
        let single = chunks.len() == 1;
        let points: Vec<PointRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(position, (vector, payload))| {
                let id = match payload.chunk_index() {
                    Some(chunk_index) => ids::chunk_point_id(logical_key, chunk_index),
                    None if single => ids::point_id(logical_key),
                    None => ids::chunk_point_id(logical_key, position as u64),
                };
                PointRecord { id, vector, payload: payload.to_map() }
            })
            .collect();
        let count = points.len();
        backend.upsert(collection, points).await?;
        info!(collection, logical_key, count, "indexed chunks");
        Ok(count)
    }

    /// Ranked similarity search scoped by tenant/document/category.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        scope: &SearchScope,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredPoint>> {
        let backend = self.backend().await?;
        search::search(backend.as_ref(), collection, vector, scope, options).await
    }

    /// Delete every chunk of one crawled source URL.
    pub async fn delete_url(&self, collection: &str, url: &str) -> Result<()> {
        let backend = self.backend().await?;
        dedup::delete_by_field(backend.as_ref(), collection, "url", url).await
    }

    /// Delete every chunk of one document.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> Result<()> {
        let backend = self.backend().await?;
        dedup::delete_by_field(backend.as_ref(), collection, "doc_id", doc_id).await
    }

    /// Delete one user's points across collections, reporting per-collection
    /// success/failure.
    pub async fn delete_user_data(
        &self,
        collections: &[&str],
        user_id: &str,
    ) -> Result<DeleteReport> {
        let backend = self.backend().await?;
        Ok(dedup::delete_user_data(backend.as_ref(), collections, user_id).await)
    }

    /// List the indexed sources of a collection for re-crawl dedup.
    pub async fn first_chunk_index(
        &self,
        collection: &str,
        url_field: &str,
    ) -> Result<Vec<FirstChunkRecord>> {
        let backend = self.backend().await?;
        dedup::first_chunk_index(backend.as_ref(), collection, url_field).await
    }

    /// Distinct values of a payload field, up to `max_values`.
    pub async fn unique_values(
        &self,
        collection: &str,
        field: &str,
        max_values: usize,
    ) -> Result<Vec<Value>> {
        let backend = self.backend().await?;
        facets::unique_values(backend.as_ref(), collection, field, max_values).await
    }

    /// Per-value counts of a payload field, optionally pre-filtered.
    pub async fn value_counts(
        &self,
        collection: &str,
        field: &str,
        max_values: usize,
        base_filter: Option<Filter>,
    ) -> Result<Vec<FacetCount>> {
        let backend = self.backend().await?;
        facets::value_counts(backend.as_ref(), collection, field, max_values, base_filter).await
    }

    /// (min, max) extent of a string-comparable date field.
    pub async fn date_range(
        &self,
        collection: &str,
        field: &str,
    ) -> Result<Option<(String, String)>> {
        let backend = self.backend().await?;
        facets::date_range(backend.as_ref(), collection, field).await
    }

    /// Approximately uniform sample of a filtered subset.
    pub async fn sample(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<PayloadMap>> {
        let backend = self.backend().await?;
        sample::sample(backend.as_ref(), collection, filter, limit).await
    }
}
