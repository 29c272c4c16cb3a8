//! Provisioning idempotence and race-tolerance tests.

use std::sync::Arc;

use async_trait::async_trait;
use scribe_vector::backend::{
    PointRecord, ScoredPoint, ScrollPage, ScrollRequest, SearchRequest, VectorBackend,
};
use scribe_vector::error::{Result, VectorError};
use scribe_vector::filter::Filter;
use scribe_vector::memory::MemoryBackend;
use scribe_vector::schema::{
    self, CollectionSettings, CollectionSpec, FieldIndexKind, IndexPreset, OptimizerPreset,
};

const DIM: usize = 8;

#[tokio::test]
async fn provisioning_twice_is_idempotent() {
    let backend = MemoryBackend::new();
    schema::provision_all(&backend, DIM).await.unwrap();
    schema::provision_all(&backend, DIM).await.unwrap();

    let mut collections = backend.list_collections().await.unwrap();
    collections.sort();
    let mut declared: Vec<String> = schema::REGISTRY.iter().map(|s| s.name.to_string()).collect();
    declared.sort();
    assert_eq!(collections, declared);
}

#[tokio::test]
async fn concurrent_provisioning_runs_both_complete() {
    let backend = MemoryBackend::new();
    let (first, second) =
        tokio::join!(schema::provision_all(&backend, DIM), schema::provision_all(&backend, DIM));
    first.unwrap();
    second.unwrap();

    assert_eq!(backend.list_collections().await.unwrap().len(), schema::REGISTRY.len());
}

/// Wraps the in-memory backend but always reports an empty deployment, so
/// provisioning always attempts creation: the shape of a race where
/// another process created the collection between our list and our create.
#[derive(Debug)]
struct RacingBackend {
    inner: Arc<MemoryBackend>,
}

#[async_trait]
impl VectorBackend for RacingBackend {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }

    async fn create_collection(&self, name: &str, settings: &CollectionSettings) -> Result<()> {
        self.inner.create_collection(name, settings).await
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldIndexKind,
    ) -> Result<()> {
        self.inner.create_payload_index(collection, field, kind).await
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        self.inner.upsert(collection, points).await
    }

    async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<()> {
        self.inner.delete_by_filter(collection, filter).await
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>> {
        self.inner.search(collection, request).await
    }

    async fn scroll(&self, collection: &str, request: &ScrollRequest) -> Result<ScrollPage> {
        self.inner.scroll(collection, request).await
    }

    async fn count(&self, collection: &str, filter: Option<&Filter>, exact: bool) -> Result<u64> {
        self.inner.count(collection, filter, exact).await
    }
}

#[tokio::test]
async fn racing_creation_of_tolerant_collections_is_swallowed() {
    let inner = Arc::new(MemoryBackend::new());
    let racing = RacingBackend { inner: inner.clone() };

    // First run provisions everything; the second believes the deployment is
    // empty and races every creation into "already exists".
    schema::provision_all(&racing, DIM).await.unwrap();
    schema::provision_all(&racing, DIM).await.unwrap();

    assert_eq!(inner.list_collections().await.unwrap().len(), schema::REGISTRY.len());
}

#[tokio::test]
async fn racing_creation_of_an_intolerant_collection_is_fatal() {
    const SINGLE_OWNER: &[CollectionSpec] = &[CollectionSpec {
        name: "reference_corpus",
        optimizer: OptimizerPreset::Compact,
        index: IndexPreset::Minimal,
        payload_indexes: &[("entry_id", FieldIndexKind::Keyword)],
        race_tolerant: false,
    }];

    let inner = Arc::new(MemoryBackend::new());
    let racing = RacingBackend { inner };

    schema::provision(&racing, SINGLE_OWNER, DIM).await.unwrap();
    let err = schema::provision(&racing, SINGLE_OWNER, DIM).await.unwrap_err();
    assert!(matches!(err, VectorError::AlreadyExists { .. }));
}
